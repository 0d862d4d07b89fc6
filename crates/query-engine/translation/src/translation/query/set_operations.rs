//! Handle quantifiers (`any`, `all`, `contains`) and the set operations built on them
//! (`intersect`, `except`).

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Aggregator, Expression, Projection, TableAlias};

use super::expressions::{equate, scalar};
use super::fields::apply_distinct;
use super::filtering::{apply_predicate, filter};
use super::projection::{into_source, single_column_select};
use super::root::{bind, bind_lambda, bind_sequence, bind_source, single_row, Source, VALUE_COLUMN};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Translate a nested `any` node into a predicate.
pub fn translate_any(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    predicate: Option<&chain::Lambda>,
) -> Result<Expression, Error> {
    match bind_source(env, state, scope, source)? {
        Source::InMemory(items) => match predicate {
            None => Ok(bool_expr(!items.is_empty())),
            Some(predicate) => Ok(sql::helpers::or_all(apply_each(
                env, state, scope, predicate, items,
            )?)
            .unwrap_or_else(sql::helpers::false_expr)),
        },
        Source::Query(projection) => {
            let projection = match predicate {
                Some(predicate) => apply_predicate(env, state, scope, projection, predicate)?,
                None => projection,
            };
            Ok(exists(projection))
        }
    }
}

/// Translate a nested `all` node into a predicate: no row fails the predicate.
pub fn translate_all(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    predicate: &chain::Lambda,
) -> Result<Expression, Error> {
    match bind_source(env, state, scope, source)? {
        Source::InMemory(items) => Ok(sql::helpers::and_all(apply_each(
            env, state, scope, predicate, items,
        )?)
        .unwrap_or_else(sql::helpers::true_expr)),
        Source::Query(projection) => {
            let holds = bind_lambda(env, state, scope, predicate, &[projection.projector.clone()])?;
            let failing = filter(projection, sql::helpers::not(holds));
            Ok(sql::helpers::not(exists(failing)))
        }
    }
}

/// Translate a nested `contains` node into a predicate.
pub fn translate_contains(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
    value: &chain::Expression,
) -> Result<Expression, Error> {
    let source = bind_source(env, state, scope, source)?;
    let value = bind(env, state, scope, value)?;
    contains(source, value)
}

/// Translate an `intersect` node: distinct rows of `first` that also occur in `second`.
pub fn translate_intersect(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    first: &chain::Expression,
    second: &chain::Expression,
) -> Result<Projection, Error> {
    membership(env, state, scope, first, second, true)
}

/// Translate an `except` node: distinct rows of `first` that do not occur in `second`.
pub fn translate_except(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    first: &chain::Expression,
    second: &chain::Expression,
) -> Result<Projection, Error> {
    membership(env, state, scope, first, second, false)
}

/// Translate `any`, `all` or `contains` at the root of a chain, reading back one value.
///
/// Dialects that cannot select a bare subquery count the rows deciding the answer instead:
/// matching rows for `any` and `contains`, failing rows for `all`.
pub fn translate_root_quantifier(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    chain: &chain::Expression,
) -> Result<Projection, Error> {
    if env.dialect().supports_subquery_outside_from() {
        let answer = bind(env, state, scope, chain)?;
        return Ok(single_row(answer));
    }

    let (source, test) = match chain {
        chain::Expression::Any { source, predicate } => (source, Test::Any(predicate.as_ref())),
        chain::Expression::All { source, predicate } => (source, Test::All(predicate)),
        chain::Expression::Contains { source, value } => (source, Test::Contains(value)),
        other => {
            return Err(Error::InvariantViolation(format!(
                "{} is not a quantifier",
                other.kind()
            )))
        }
    };
    let source = bind_source(env, state, scope, source)?;
    let value = match test {
        Test::Contains(value) => Some(bind(env, state, scope, value)?),
        Test::Any(_) | Test::All(_) => None,
    };

    let alias = TableAlias::new();
    let count = vec![sql::helpers::make_column_declaration(
        VALUE_COLUMN,
        sql::helpers::count_star(),
    )];
    let select = match source {
        Source::Query(projection) => {
            let row = projection.projector.clone();
            let condition = match (test, value) {
                (Test::Any(None), _) => None,
                (Test::Any(Some(predicate)), _) => {
                    Some(bind_lambda(env, state, scope, predicate, &[row])?)
                }
                (Test::All(predicate), _) => Some(sql::helpers::not(bind_lambda(
                    env,
                    state,
                    scope,
                    predicate,
                    &[row],
                )?)),
                (Test::Contains(_), Some(value)) => Some(equate(row, value)?),
                (Test::Contains(_), None) => None,
            };
            let (from, _) = into_source(projection.select);
            let mut select = sql::helpers::select_from(alias, count, from);
            select.where_ = condition;
            select
        }
        // in-memory containment is spelled as equalities, never as an IN list
        Source::InMemory(items) => {
            let matching = match (test, value) {
                (Test::Any(None), _) => vec![bool_expr(!items.is_empty())],
                (Test::Any(Some(predicate)), _) => apply_each(env, state, scope, predicate, items)?,
                (Test::All(predicate), _) => apply_each(env, state, scope, predicate, items)?
                    .into_iter()
                    .map(sql::helpers::not)
                    .collect(),
                (Test::Contains(_), Some(value)) => items
                    .into_iter()
                    .map(|item| equate(item, value.clone()))
                    .collect::<Result<_, _>>()?,
                (Test::Contains(_), None) => vec![],
            };
            let mut select = sql::helpers::simple_select(alias, count);
            select.where_ =
                Some(sql::helpers::or_all(matching).unwrap_or_else(sql::helpers::false_expr));
            select
        }
    };

    let counted = sql::helpers::make_column(alias, VALUE_COLUMN, ScalarType::Integer);
    let projector = match test {
        Test::All(_) => sql::helpers::equals(counted, sql::helpers::int_expr(0)),
        Test::Any(_) | Test::Contains(_) => sql::helpers::binary(
            counted,
            sql::ast::BinaryOperator::GreaterThan,
            sql::helpers::int_expr(0),
        ),
    };
    Ok(Projection {
        select,
        projector,
        aggregator: Some(Aggregator::SingleValue),
    })
}

#[derive(Clone, Copy)]
enum Test<'a> {
    Any(Option<&'a chain::Lambda>),
    All(&'a chain::Lambda),
    Contains(&'a chain::Expression),
}

fn membership(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    first: &chain::Expression,
    second: &chain::Expression,
    keep_members: bool,
) -> Result<Projection, Error> {
    let first = bind_sequence(env, state, scope, first)?;
    let second = bind_source(env, state, scope, second)?;
    let is_member = contains(second, first.projector.clone())?;
    let predicate = if keep_members {
        is_member
    } else {
        sql::helpers::not(is_member)
    };
    Ok(apply_distinct(filter(first, predicate)))
}

fn contains(source: Source, value: Expression) -> Result<Expression, Error> {
    match source {
        Source::InMemory(items) if items.is_empty() => Ok(sql::helpers::false_expr()),
        Source::InMemory(items) => Ok(Expression::In {
            expression: Box::new(scalar(value)?),
            values: items,
        }),
        Source::Query(projection) if !projection.projector.is_shape() && !value.is_shape() => {
            Ok(Expression::InSelect {
                expression: Box::new(value),
                select: Box::new(single_column_select(projection)),
            })
        }
        Source::Query(projection) => {
            let matches = equate(projection.projector.clone(), value)?;
            Ok(exists(filter(projection, matches)))
        }
    }
}

fn exists(projection: Projection) -> Expression {
    let mut select = projection.select;
    if select.skip.is_none() && select.take.is_none() {
        select.order_by.clear();
    }
    Expression::Exists {
        select: Box::new(select),
    }
}

fn apply_each(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    lambda: &chain::Lambda,
    items: Vec<Expression>,
) -> Result<Vec<Expression>, Error> {
    items
        .into_iter()
        .map(|item| bind_lambda(env, state, scope, lambda, &[item]))
        .collect()
}

fn bool_expr(value: bool) -> Expression {
    if value {
        sql::helpers::true_expr()
    } else {
        sql::helpers::false_expr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::test_support::{
        bind_root, bind_root_with, member_lambda, metadata, parse_chain, table,
    };
    use seqsql_configuration::DialectSettings;

    fn any_over_constants(predicate: &str) -> String {
        format!(
            r#"{{
                "type": "any",
                "source": {{ "type": "constant", "value": [1, 2, 3] }},
                "predicate": {{
                    "parameters": ["x"],
                    "body": {{
                        "type": "binary",
                        "operator": "{predicate}",
                        "left": {{ "type": "parameter", "name": "x" }},
                        "right": {{ "type": "external", "name": "limit", "value": 2 }}
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn in_memory_quantifiers_are_disjunctions() {
        let projection = bind_root(&parse_chain(&any_over_constants("greater_than"))).unwrap();
        assert_eq!(projection.aggregator, Some(Aggregator::SingleValue));
        let Expression::Or { .. } = &projection.select.columns[0].expression else {
            panic!("expected a disjunction");
        };
        assert!(projection.select.from.is_none());
    }

    #[test]
    fn without_bare_subqueries_quantifiers_count_rows() {
        let projection = bind_root_with(
            &metadata(),
            &DialectSettings::sql_server(),
            &parse_chain(&any_over_constants("greater_than")),
        )
        .unwrap();
        assert_eq!(
            projection.select.columns[0].expression,
            sql::helpers::count_star()
        );
        assert!(matches!(
            projection.select.where_,
            Some(Expression::Or { .. })
        ));
        assert!(matches!(
            projection.projector,
            Expression::BinaryOperation {
                operator: sql::ast::BinaryOperator::GreaterThan,
                ..
            }
        ));
    }

    #[test]
    fn in_memory_contains_never_uses_in_when_counting() {
        let chain = parse_chain(
            r#"{
                "type": "contains",
                "source": { "type": "constant", "value": [1, 2, 3] },
                "value": { "type": "external", "name": "id", "value": 2 }
            }"#,
        );
        let projection =
            bind_root_with(&metadata(), &DialectSettings::sql_server(), &chain).unwrap();
        let Some(condition) = &projection.select.where_ else {
            panic!("expected a condition");
        };
        assert!(!matches!(condition, Expression::In { .. }));

        let projection = bind_root(&chain).unwrap();
        assert!(matches!(
            projection.select.columns[0].expression,
            Expression::In { .. }
        ));
    }

    #[test]
    fn nested_any_is_exists() {
        let chain = chain::Expression::Where {
            source: Box::new(parse_chain(&table("Person"))),
            predicate: chain::Lambda {
                parameters: vec!["p".to_string()],
                body: Box::new(chain::Expression::Any {
                    source: Box::new(parse_chain(&table("Order"))),
                    predicate: None,
                }),
            },
        };
        let projection = bind_root(&chain).unwrap();
        assert!(matches!(
            projection.select.where_,
            Some(Expression::Exists { .. })
        ));
    }

    #[test]
    fn except_keeps_distinct_non_members() {
        let names = |entity: &str| chain::Expression::Select {
            source: Box::new(parse_chain(&table(entity))),
            selector: member_lambda("Id"),
        };
        let chain = chain::Expression::Except {
            first: Box::new(names("Person")),
            second: Box::new(names("Order")),
        };
        let projection = bind_root(&chain).unwrap();
        assert!(projection.select.is_distinct);
        let Some(sql::ast::From::Select(filtered)) = &projection.select.from else {
            panic!("expected the filtered rows as the source");
        };
        let Some(Expression::Not(membership)) = &filtered.where_ else {
            panic!("expected a negated membership test");
        };
        assert!(matches!(**membership, Expression::InSelect { .. }));
    }
}
