//! Handle operators that reshape each row: projection, conversion, and duplicate removal.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql::ast::Projection;

use super::expressions::translate_convert;
use super::projection::{reproject, wrap};
use super::root::{bind_lambda, bind_sequence};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Translate a `select` node.
pub fn translate_select(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    selector: &chain::Lambda,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    let projector = bind_lambda(env, state, scope, selector, &[source.projector.clone()])?;
    Ok(reproject(source, projector))
}

/// Translate a `cast` node: every element converted to `to`.
pub fn translate_cast(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    to: ScalarType,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    let projector = translate_convert(source.projector.clone(), to)?;
    Ok(reproject(source, projector))
}

/// Translate a `distinct` node.
pub fn translate_distinct(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    Ok(apply_distinct(source))
}

/// Remove duplicate rows. Distinct rows have no defined order.
pub fn apply_distinct(source: Projection) -> Projection {
    let mut projection = wrap(source);
    projection.select.is_distinct = true;
    projection.select.order_by.clear();
    projection
}
