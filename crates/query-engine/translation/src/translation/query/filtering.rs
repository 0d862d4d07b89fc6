//! Handle filtering.

use query_engine_sql::sql::ast::{Expression, Projection};

use super::projection::wrap;
use super::root::{bind_lambda, bind_sequence};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Translate a `where` node.
pub fn translate_where(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    predicate: &chain::Lambda,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    apply_predicate(env, state, scope, source, predicate)
}

/// Keep the rows of `source` the predicate holds for.
pub fn apply_predicate(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: Projection,
    predicate: &chain::Lambda,
) -> Result<Projection, Error> {
    let predicate = bind_lambda(env, state, scope, predicate, &[source.projector.clone()])?;
    Ok(filter(source, predicate))
}

/// Wrap `source` in a select filtered by `predicate`, which is written over the source's row.
pub fn filter(source: Projection, predicate: Expression) -> Projection {
    let mut projection = wrap(source);
    projection.select.where_ = Some(predicate);
    projection
}
