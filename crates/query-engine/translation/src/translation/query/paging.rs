//! Handle paging: skip, take, and picking a single element.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Aggregator, Expression, Projection};

use super::expressions::scalar;
use super::filtering::apply_predicate;
use super::projection::{single_column_select, wrap};
use super::root::{bind, bind_sequence};
use super::sorting::reversed;
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Translate a `take` node.
pub fn translate_take(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    count: &chain::Expression,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    let count = bind_count(env, state, scope, count)?;
    Ok(limit(state, source, count))
}

/// Translate a `skip` node.
pub fn translate_skip(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    count: &chain::Expression,
) -> Result<Projection, Error> {
    let source = bind_sequence(env, state, scope, source)?;
    let count = bind_count(env, state, scope, count)?;
    // rows skipped after a limit would be the wrong rows
    let mut projection = if source.select.skip.is_none()
        && source.select.take.is_none()
        && can_page_in_place(state, &source)
    {
        source
    } else {
        wrap(source)
    };
    projection.select.skip = Some(count);
    Ok(projection)
}

/// Translate `first`, `single` or `last` at the root of a chain.
///
/// `single` asks for two rows, so that whoever reads the result can tell one from many.
pub fn translate_element(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    kind: chain::ElementKind,
    or_default: bool,
    predicate: Option<&chain::Lambda>,
) -> Result<Projection, Error> {
    let mut source = bind_sequence(env, state, scope, source)?;
    if let Some(predicate) = predicate {
        source = apply_predicate(env, state, scope, source, predicate)?;
    }
    let (mut projection, aggregator) = match kind {
        chain::ElementKind::First => (
            limit(state, source, sql::helpers::int_expr(1)),
            Aggregator::First { or_default },
        ),
        chain::ElementKind::Single => (
            limit(state, source, sql::helpers::int_expr(2)),
            Aggregator::Single { or_default },
        ),
        // without an ordering the reader keeps the final row it sees
        chain::ElementKind::Last if source.select.order_by.is_empty() => {
            (source, Aggregator::Last { or_default })
        }
        chain::ElementKind::Last => {
            let mut projection = reversed(source);
            projection.select.take = Some(sql::helpers::int_expr(1));
            (projection, Aggregator::Last { or_default })
        }
    };
    projection.aggregator = Some(aggregator);
    Ok(projection)
}

/// Translate `first`, `single` or `last` inside another query. A single value becomes a scalar
/// subquery; a record stays a nested projection.
pub fn translate_nested_element(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    kind: chain::ElementKind,
    or_default: bool,
    predicate: Option<&chain::Lambda>,
) -> Result<Expression, Error> {
    let projection = translate_element(env, state, scope, source, kind, or_default, predicate)?;
    nested_element(projection)
}

/// The value of a picked element inside another query: a nested projection when it is a record,
/// otherwise a scalar subquery reading its one row.
pub fn nested_element(projection: Projection) -> Result<Expression, Error> {
    if projection.projector.is_shape() {
        return Ok(Expression::Projection(Box::new(projection)));
    }
    if projection.select.take.is_none() {
        return Err(Error::UnsupportedConstruct(
            "last element of an unordered sequence inside a query".to_string(),
        ));
    }
    let r#type = projection
        .projector
        .scalar_type()
        .unwrap_or(ScalarType::Any);
    Ok(Expression::ScalarSubquery {
        select: Box::new(single_column_select(projection)),
        r#type,
    })
}

/// Limit `source` to `count` rows, on its own select when that does not change its meaning.
fn limit(state: &State, source: Projection, count: Expression) -> Projection {
    let mut projection = if source.select.take.is_none() && can_page_in_place(state, &source) {
        source
    } else {
        wrap(source)
    };
    projection.select.take = Some(count);
    projection
}

/// The elements of a group are shared with the aggregates that read them, so they are never
/// paged in place.
fn can_page_in_place(state: &State, projection: &Projection) -> bool {
    projection.aggregator.is_none() && state.lookup_group(projection.select.alias).is_none()
}

fn bind_count(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    count: &chain::Expression,
) -> Result<Expression, Error> {
    let count = scalar(bind(env, state, scope, count)?)?;
    match count.scalar_type().unwrap_or(ScalarType::Any) {
        ScalarType::Any => Ok(count),
        found if found.is_integral() => Ok(count),
        found => Err(Error::type_mismatch(found, "an integer row count")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::test_support::{bind_root, parse_chain, table};

    fn paged(kind: &str, source: &str, count: &str) -> Projection {
        bind_root(&parse_chain(&format!(
            r#"{{ "type": "{kind}", "source": {source}, "count": {count} }}"#
        )))
        .unwrap()
    }

    #[test]
    fn take_pages_the_source_select() {
        let projection = paged("take", &table("Person"), r#"{ "type": "constant", "value": 5 }"#);
        assert_eq!(projection.select.take, Some(sql::helpers::int_expr(5)));
        assert!(matches!(
            projection.select.from,
            Some(sql::ast::From::Table { .. })
        ));
    }

    #[test]
    fn skip_after_take_wraps() {
        let take = format!(
            r#"{{ "type": "take", "source": {}, "count": {{ "type": "constant", "value": 5 }} }}"#,
            table("Person")
        );
        let projection = paged("skip", &take, r#"{ "type": "constant", "value": 2 }"#);
        assert_eq!(projection.select.skip, Some(sql::helpers::int_expr(2)));
        assert_eq!(projection.select.take, None);
        let Some(sql::ast::From::Select(inner)) = projection.select.from else {
            panic!("expected the limited select as the source");
        };
        assert_eq!(inner.take, Some(sql::helpers::int_expr(5)));
    }

    #[test]
    fn take_after_skip_pages_in_place() {
        let skip = format!(
            r#"{{ "type": "skip", "source": {}, "count": {{ "type": "constant", "value": 2 }} }}"#,
            table("Person")
        );
        let projection = paged("take", &skip, r#"{ "type": "constant", "value": 5 }"#);
        assert_eq!(projection.select.skip, Some(sql::helpers::int_expr(2)));
        assert_eq!(projection.select.take, Some(sql::helpers::int_expr(5)));
    }

    #[test]
    fn row_counts_must_be_integers() {
        let result = bind_root(&parse_chain(&format!(
            r#"{{ "type": "take", "source": {}, "count": {{ "type": "constant", "value": "five" }} }}"#,
            table("Person")
        )));
        assert!(matches!(result, Err(Error::TypeMismatch { .. })));
    }

    #[test]
    fn single_asks_for_two_rows() {
        let projection = bind_root(&parse_chain(&format!(
            r#"{{ "type": "element", "kind": "single", "or_default": true, "source": {} }}"#,
            table("Person")
        )))
        .unwrap();
        assert_eq!(projection.select.take, Some(sql::helpers::int_expr(2)));
        assert_eq!(
            projection.aggregator,
            Some(Aggregator::Single { or_default: true })
        );
    }

    #[test]
    fn last_of_an_ordered_sequence_reads_the_first_row_backwards() {
        let ordered = format!(
            r#"{{
                "type": "order_by",
                "source": {},
                "key": {{
                    "parameters": ["p"],
                    "body": {{
                        "type": "member",
                        "expression": {{ "type": "parameter", "name": "p" }},
                        "member": "Age"
                    }}
                }}
            }}"#,
            table("Person")
        );
        let projection = bind_root(&parse_chain(&format!(
            r#"{{ "type": "element", "kind": "last", "source": {ordered} }}"#
        )))
        .unwrap();
        assert_eq!(projection.select.take, Some(sql::helpers::int_expr(1)));
        assert!(projection.select.is_reverse);
        let directions: Vec<_> = projection
            .select
            .ordering()
            .iter()
            .map(|element| element.direction)
            .collect();
        assert_eq!(directions, vec![sql::ast::OrderByDirection::Desc]);
    }

    #[test]
    fn last_without_ordering_reads_every_row() {
        let projection = bind_root(&parse_chain(&format!(
            r#"{{ "type": "element", "kind": "last", "source": {} }}"#,
            table("Person")
        )))
        .unwrap();
        assert_eq!(projection.select.take, None);
        assert_eq!(
            projection.aggregator,
            Some(Aggregator::Last { or_default: false })
        );
    }
}
