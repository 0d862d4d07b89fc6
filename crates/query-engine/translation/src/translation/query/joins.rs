//! Handle joins: `join`, `group_join` and `select_many`.

use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Expression, Join, JoinType, Projection, TableAlias};

use super::expressions::equate;
use super::filtering::filter;
use super::projection::{into_source, project_columns, ProjectedColumns};
use super::root::{bind_lambda, bind_sequence};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// The pieces of a `join` or `group_join` node.
pub struct JoinParts<'a> {
    pub outer: &'a chain::Expression,
    pub inner: &'a chain::Expression,
    pub outer_key: &'a chain::Lambda,
    pub inner_key: &'a chain::Lambda,
    pub result: &'a chain::Lambda,
}

/// Translate a `join` node: an inner join on key equality.
pub fn translate_join(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    parts: &JoinParts,
) -> Result<Projection, Error> {
    let outer = bind_sequence(env, state, scope, parts.outer)?;
    let inner = bind_sequence(env, state, scope, parts.inner)?;
    let outer_key = bind_lambda(env, state, scope, parts.outer_key, &[outer.projector.clone()])?;
    let inner_key = bind_lambda(env, state, scope, parts.inner_key, &[inner.projector.clone()])?;
    let condition = equate(outer_key, inner_key)?;
    let result = bind_lambda(
        env,
        state,
        scope,
        parts.result,
        &[outer.projector.clone(), inner.projector.clone()],
    )?;
    Ok(join_projection(
        JoinType::InnerJoin,
        outer,
        inner,
        Some(condition),
        result,
    ))
}

/// Translate a `group_join` node. Each outer row sees the inner rows matching its key as a
/// correlated sequence.
pub fn translate_group_join(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    parts: &JoinParts,
) -> Result<Projection, Error> {
    let outer = bind_sequence(env, state, scope, parts.outer)?;
    let inner = bind_sequence(env, state, scope, parts.inner)?;
    let outer_key = bind_lambda(env, state, scope, parts.outer_key, &[outer.projector.clone()])?;
    let inner_key = bind_lambda(env, state, scope, parts.inner_key, &[inner.projector.clone()])?;
    let matches = filter(inner, equate(inner_key, outer_key)?);
    let result = bind_lambda(
        env,
        state,
        scope,
        parts.result,
        &[
            outer.projector.clone(),
            Expression::Projection(Box::new(matches)),
        ],
    )?;

    let alias = TableAlias::new();
    let ProjectedColumns { columns, projector } =
        project_columns(result, alias, &[outer.select.alias]);
    let (from, order_by) = into_source(outer.select);
    let mut select = sql::helpers::select_from(alias, columns, from);
    select.order_by = order_by;
    Ok(Projection {
        select,
        projector,
        aggregator: None,
    })
}

/// Translate a `select_many` node.
///
/// A table collection is crossed with the source. Any other collection may read the source's
/// row, so it is applied to each row, keeping rows with no matches when the collection is
/// wrapped in `default_if_empty`.
pub fn translate_select_many(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    collection: &chain::Lambda,
    result: Option<&chain::Lambda>,
) -> Result<Projection, Error> {
    let outer = bind_sequence(env, state, scope, source)?;

    let [parameter] = collection.parameters.as_slice() else {
        return Err(Error::InvariantViolation(format!(
            "select_many collection takes {} parameters rather than one",
            collection.parameters.len()
        )));
    };
    let (body, keep_unmatched) = match collection.body.as_ref() {
        chain::Expression::DefaultIfEmpty { source } => (source.as_ref(), true),
        body => (body, false),
    };
    let kind = match body {
        chain::Expression::Table { .. } if !keep_unmatched => JoinType::CrossJoin,
        _ if keep_unmatched => JoinType::OuterApply,
        _ => JoinType::CrossApply,
    };
    let collection_scope = scope.bind(parameter, outer.projector.clone());
    let inner = bind_sequence(env, state, &collection_scope, body)?;

    let result = match result {
        Some(result) => bind_lambda(
            env,
            state,
            scope,
            result,
            &[outer.projector.clone(), inner.projector.clone()],
        )?,
        None => inner.projector.clone(),
    };
    Ok(join_projection(kind, outer, inner, None, result))
}

/// Select `result`, written over the rows of both sides, from a join of `outer` and `inner`.
/// The outer side's ordering is kept.
fn join_projection(
    kind: JoinType,
    outer: Projection,
    inner: Projection,
    condition: Option<Expression>,
    result: Expression,
) -> Projection {
    let alias = TableAlias::new();
    let ProjectedColumns { columns, projector } =
        project_columns(result, alias, &[outer.select.alias, inner.select.alias]);
    let (left, order_by) = into_source(outer.select);
    let (right, _) = into_source(inner.select);
    let join = Join {
        kind,
        left,
        right,
        condition,
    };
    let mut select = sql::helpers::select_from(alias, columns, sql::ast::From::Join(Box::new(join)));
    select.order_by = order_by;
    Projection {
        select,
        projector,
        aggregator: None,
    }
}
