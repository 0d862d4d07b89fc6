//! Handle sorting.

use query_engine_sql::sql::ast::{Expression, OrderByDirection, OrderByElement, Projection};

use super::expressions::{is_constant, key_leaves};
use super::projection::wrap;
use super::root::{bind_lambda, bind_sequence};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, PendingOrdering, Scope, State};

/// Translate an `order_by` node, together with the `then_by` keys queued above it.
pub fn translate_order_by(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    key: &chain::Lambda,
    descending: bool,
) -> Result<Projection, Error> {
    // claim the secondary keys before the source can see them
    let pending = state.take_then_by();
    let source = bind_sequence(env, state, scope, source)?;

    let keys = std::iter::once((key, descending))
        .chain(pending.iter().map(|pending| (&pending.key, pending.descending)));
    let mut order_by = vec![];
    for (key, descending) in keys {
        let target = bind_lambda(env, state, scope, key, &[source.projector.clone()])?;
        order_by.extend(order_by_elements(&target, descending)?);
    }

    let mut projection = wrap(source);
    projection.select.order_by = order_by;
    Ok(projection)
}

/// Translate a `then_by` node. Its key is applied by the `order_by` below it.
pub fn translate_then_by(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    key: &chain::Lambda,
    descending: bool,
) -> Result<Projection, Error> {
    if !matches!(
        source,
        chain::Expression::OrderBy { .. } | chain::Expression::ThenBy { .. }
    ) {
        return Err(Error::InvariantViolation(format!(
            "then_by applied to {} rather than an ordered sequence",
            source.kind()
        )));
    }
    state.push_then_by(PendingOrdering {
        key: key.clone(),
        descending,
    });
    bind_sequence(env, state, scope, source)
}

/// Translate a `reverse` node. Only an ordered sequence has an order to reverse.
pub fn translate_reverse(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    if source.select.order_by.is_empty() {
        return Err(Error::UnsupportedConstruct(
            "reverse of an unordered sequence".to_string(),
        ));
    }
    Ok(reversed(source))
}

/// Wrap `source` in a select applying its ordering backwards.
pub fn reversed(source: Projection) -> Projection {
    let mut projection = wrap(source);
    projection.select.is_reverse = true;
    projection
}

fn order_by_elements(target: &Expression, descending: bool) -> Result<Vec<OrderByElement>, Error> {
    let direction = if descending {
        OrderByDirection::Desc
    } else {
        OrderByDirection::Asc
    };
    key_leaves(target)
        .into_iter()
        .filter(|leaf| !is_constant(leaf))
        .map(|leaf| {
            if leaf.is_shape() {
                Err(Error::UnsupportedConstruct(
                    "ordering by a group or a sequence".to_string(),
                ))
            } else {
                Ok(OrderByElement {
                    target: leaf,
                    direction,
                })
            }
        })
        .collect()
}
