//! Handle grouping.
//!
//! A grouped query selects from its source with a GROUP BY over the key's scalar parts. The
//! elements of each group are a second, independent reading of the source, correlated to the
//! group by null-safe equality on every key part. Aggregates over those elements either fold
//! into the grouped select itself or become correlated subqueries; a `GroupByDescriptor` keyed by
//! the element select's alias lets them tell which.

use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Expression, Projection, TableAlias};

use super::expressions::{is_constant, key_leaves};
use super::projection::{into_source, project_columns, ProjectedColumns};
use super::root::{bind_lambda, bind_sequence};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, GroupByDescriptor, Scope, State};

/// Translate a `group_by` node.
pub fn translate_group_by(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    key: &chain::Lambda,
    element: Option<&chain::Lambda>,
    result: Option<&chain::Lambda>,
) -> Result<Projection, Error> {
    let grouped = bind_sequence(env, state, scope, source)?;
    let key_expression = bind_lambda(env, state, scope, key, &[grouped.projector.clone()])?;
    let element_expression = match element {
        Some(element) => bind_lambda(env, state, scope, element, &[grouped.projector.clone()])?,
        None => grouped.projector.clone(),
    };
    let group_keys = key_leaves(&key_expression);
    if group_keys.iter().any(Expression::is_shape) {
        return Err(Error::UnsupportedConstruct(
            "grouping by a sequence".to_string(),
        ));
    }

    let elements = translate_group_elements(env, state, scope, source, key, element, &group_keys)?;
    let element_alias = elements.select.alias;

    let alias = TableAlias::new();
    state.register_group(
        element_alias,
        GroupByDescriptor {
            alias,
            element: element_expression,
        },
    )?;
    tracing::debug!(
        group = alias.unique_index(),
        elements = element_alias.unique_index(),
        "registered group"
    );

    let result_expression = match result {
        Some(result) => {
            let previous = state.replace_current_group_element(Some(element_alias));
            let bound = bind_lambda(
                env,
                state,
                scope,
                result,
                &[key_expression, Expression::Projection(Box::new(elements))],
            );
            state.replace_current_group_element(previous);
            bound?
        }
        None => Expression::Grouping {
            key: Box::new(key_expression),
            elements: Box::new(elements),
        },
    };

    let ProjectedColumns { columns, projector } =
        project_columns(result_expression, alias, &[grouped.select.alias]);
    // groups have no order of their own
    let (from, _) = into_source(grouped.select);
    let mut select = sql::helpers::select_from(alias, columns, from);
    let has_keys = !group_keys.is_empty();
    select.group_by = group_keys
        .into_iter()
        .filter(|key| !is_constant(key))
        .collect();
    // a constant key puts every row in one group
    if has_keys && select.group_by.is_empty() && !sql::aggregates::has_aggregates(&select) {
        select.is_distinct = true;
    }
    Ok(Projection {
        select,
        projector,
        aggregator: None,
    })
}

/// The elements of one group: the source read again, restricted to rows whose key matches
/// `group_keys`.
fn translate_group_elements(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    key: &chain::Lambda,
    element: Option<&chain::Lambda>,
    group_keys: &[Expression],
) -> Result<Projection, Error> {
    let basis = bind_sequence(env, state, scope, source)?;
    let basis_key = bind_lambda(env, state, scope, key, &[basis.projector.clone()])?;
    let basis_keys = key_leaves(&basis_key);
    if basis_keys.len() != group_keys.len() {
        return Err(Error::InvariantViolation(format!(
            "group key has {} parts but its elements have {}",
            group_keys.len(),
            basis_keys.len()
        )));
    }
    let correlation = sql::helpers::and_all(
        basis_keys
            .into_iter()
            .zip(group_keys.iter().cloned())
            .map(|(element_key, group_key)| sql::helpers::null_safe_equals(element_key, group_key)),
    )
    .unwrap_or_else(sql::helpers::true_expr);
    let basis_element = match element {
        Some(element) => bind_lambda(env, state, scope, element, &[basis.projector.clone()])?,
        None => basis.projector.clone(),
    };

    let alias = TableAlias::new();
    let ProjectedColumns { columns, projector } =
        project_columns(basis_element, alias, &[basis.select.alias]);
    let (from, order_by) = into_source(basis.select);
    let mut select = sql::helpers::select_from(alias, columns, from);
    select.where_ = Some(correlation);
    select.order_by = order_by;
    Ok(Projection {
        select,
        projector,
        aggregator: None,
    })
}
