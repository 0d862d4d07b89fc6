//! Handle aggregate operations: count, long_count, sum, min, max and average.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{
    Aggregate, AggregateFunction, Aggregator, Expression, Projection, Select, TableAlias,
};

use super::fields::apply_distinct;
use super::filtering::apply_predicate;
use super::projection::into_source;
use super::root::{bind, bind_lambda, VALUE_COLUMN};
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Translate an aggregate at the root of a chain: one row, one column named `value`.
pub fn translate_root_aggregate(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    function: &str,
    source: &chain::Expression,
    selector: Option<&chain::Lambda>,
    predicate: Option<&chain::Lambda>,
) -> Result<Projection, Error> {
    let bound = bind_aggregate(env, state, scope, function, source, selector, predicate)?;
    let r#type = bound.aggregate.r#type;
    let alias = TableAlias::new();
    Ok(Projection {
        select: aggregate_select(alias, VALUE_COLUMN, bound.aggregate, bound.source.select),
        projector: sql::helpers::make_column(alias, VALUE_COLUMN, r#type),
        aggregator: Some(Aggregator::SingleValue),
    })
}

/// Translate an aggregate inside another query.
///
/// Over the elements of a group whose result selector is being translated, the aggregate is
/// computed by the grouped select itself. Anywhere else it is a scalar subquery, correlated to
/// the enclosing rows through its source.
pub fn translate_nested_aggregate(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    function: &str,
    source: &chain::Expression,
    selector: Option<&chain::Lambda>,
    predicate: Option<&chain::Lambda>,
) -> Result<Expression, Error> {
    let bound = bind_aggregate(env, state, scope, function, source, selector, predicate)?;
    let source_alias = bound.source.select.alias;

    if !bound.argument_was_predicate {
        match state.lookup_group(source_alias).cloned() {
            Some(descriptor) if state.current_group_element() == Some(source_alias) => {
                // rebind the argument against the grouped source's rows
                let argument = match (selector, &bound.aggregate.argument) {
                    (Some(selector), _) => Some(bind_lambda(
                        env,
                        state,
                        scope,
                        selector,
                        &[descriptor.element],
                    )?),
                    (None, Some(_)) => Some(descriptor.element),
                    (None, None) => None,
                };
                return Ok(Expression::Aggregate(Aggregate {
                    argument: argument.map(Box::new),
                    ..bound.aggregate
                }));
            }
            Some(descriptor) => {
                tracing::debug!(
                    group = descriptor.alias.unique_index(),
                    "aggregate over the elements of a group becomes a correlated subquery"
                );
            }
            None if bound.source_was_group => {
                return Err(Error::InvariantViolation(format!(
                    "no group registered for element select {}",
                    source_alias.unique_index()
                )));
            }
            None => {}
        }
    }

    let r#type = bound.aggregate.r#type;
    Ok(Expression::ScalarSubquery {
        select: Box::new(aggregate_select(
            TableAlias::new(),
            "",
            bound.aggregate,
            bound.source.select,
        )),
        r#type,
    })
}

struct BoundAggregate {
    aggregate: Aggregate,
    /// The rows aggregated over. The aggregate's argument reads this projection's row.
    source: Projection,
    /// A predicate filtered the source, so it no longer is a group's element select.
    argument_was_predicate: bool,
    /// The source was a grouping, whose elements must have been registered.
    source_was_group: bool,
}

fn bind_aggregate(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    name: &str,
    source: &chain::Expression,
    selector: Option<&chain::Lambda>,
    predicate: Option<&chain::Lambda>,
) -> Result<BoundAggregate, Error> {
    let function = AggregateFunction::from_name(name)
        .filter(|_| env.dialect().is_aggregate(name))
        .ok_or_else(|| Error::UnsupportedConstruct(format!("aggregate function '{name}'")))?;

    // `count(distinct(x))` and friends aggregate distinct values directly
    let distinct_source = match source {
        chain::Expression::Distinct { source: inner }
            if selector.is_none()
                && predicate.is_none()
                && env.dialect().supports_distinct_in_aggregate() =>
        {
            Some(inner.as_ref())
        }
        _ => None,
    };

    let (mut projection, source_was_group, is_distinct) = match distinct_source {
        Some(inner) => {
            let (projection, source_was_group) = bind_rows(env, state, scope, inner)?;
            if !projection.projector.is_shape()
                && !sql::aggregates::has_aggregates(&projection.select)
            {
                (projection, source_was_group, true)
            } else {
                (apply_distinct(projection), false, false)
            }
        }
        None => {
            let (projection, source_was_group) = bind_rows(env, state, scope, source)?;
            (projection, source_was_group, false)
        }
    };

    let argument_was_predicate = predicate.is_some();
    if let Some(predicate) = predicate {
        projection = apply_predicate(env, state, scope, projection, predicate)?;
    }

    let argument = match selector {
        Some(selector) => Some(bind_lambda(
            env,
            state,
            scope,
            selector,
            &[projection.projector.clone()],
        )?),
        None if function.is_count() && !is_distinct => None,
        None => Some(projection.projector.clone()),
    };
    let r#type = result_type(function, argument.as_ref())?;

    Ok(BoundAggregate {
        aggregate: Aggregate {
            function,
            argument: argument.map(Box::new),
            is_distinct,
            r#type,
        },
        source: projection,
        argument_was_predicate,
        source_was_group,
    })
}

/// Bind the rows an aggregate reads, noting whether they are the elements of a grouping.
fn bind_rows(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    source: &chain::Expression,
) -> Result<(Projection, bool), Error> {
    match bind(env, state, scope, source)? {
        Expression::Projection(projection) => Ok((*projection, false)),
        Expression::Grouping { elements, .. } => Ok((*elements, true)),
        _ => Err(Error::UnsupportedConstruct(format!(
            "aggregate over {}, which is not a sequence of rows",
            source.kind()
        ))),
    }
}

/// Check the argument of an aggregate and work out what it returns.
fn result_type(
    function: AggregateFunction,
    argument: Option<&Expression>,
) -> Result<ScalarType, Error> {
    let argument_type = match argument {
        None => ScalarType::Any,
        Some(argument) => argument.scalar_type().ok_or_else(|| {
            Error::type_mismatch(
                "a record or sequence",
                format!("the argument of {}", function.name()),
            )
        })?,
    };
    match function {
        AggregateFunction::Count => Ok(ScalarType::Integer),
        AggregateFunction::LongCount => Ok(ScalarType::Bigint),
        AggregateFunction::Sum | AggregateFunction::Average
            if argument_type != ScalarType::Any && !argument_type.is_numeric() =>
        {
            Err(Error::type_mismatch(argument_type, "a number"))
        }
        AggregateFunction::Min | AggregateFunction::Max
            if argument_type != ScalarType::Any && !argument_type.is_orderable() =>
        {
            Err(Error::type_mismatch(argument_type, "an orderable value"))
        }
        AggregateFunction::Average if argument_type.is_integral() => Ok(ScalarType::Numeric),
        AggregateFunction::Sum
        | AggregateFunction::Average
        | AggregateFunction::Min
        | AggregateFunction::Max => Ok(argument_type),
    }
}

/// `SELECT <aggregate> AS <name> FROM <source>`. Ordering is irrelevant to an aggregate.
fn aggregate_select(alias: TableAlias, name: &str, aggregate: Aggregate, source: Select) -> Select {
    let (from, _) = into_source(source);
    sql::helpers::select_from(
        alias,
        vec![sql::helpers::make_column_declaration(
            name,
            Expression::Aggregate(aggregate),
        )],
        from,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::test_support::{bind_root, member_lambda, parse_chain, table};

    fn aggregate_people(function: &str, selector: Option<&str>) -> Result<Projection, Error> {
        bind_root(&chain::Expression::Aggregate {
            function: function.to_string(),
            source: Box::new(parse_chain(&table("Person"))),
            selector: selector.map(member_lambda),
            predicate: None,
        })
    }

    #[test]
    fn root_aggregates_read_a_single_value() {
        let projection = aggregate_people("count", None).unwrap();
        assert_eq!(projection.aggregator, Some(Aggregator::SingleValue));
        assert_eq!(projection.select.columns.len(), 1);
        assert_eq!(projection.select.columns[0].name.0, "value");
        assert_eq!(
            projection.select.columns[0].expression,
            sql::helpers::count_star()
        );
    }

    #[test]
    fn averages_of_integers_are_numeric() {
        let projection = aggregate_people("average", Some("Age")).unwrap();
        assert_eq!(projection.select.columns[0].r#type, ScalarType::Numeric);
    }

    #[test]
    fn sums_need_numbers() {
        assert!(matches!(
            aggregate_people("sum", Some("Name")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn unknown_aggregates_are_unsupported() {
        assert!(matches!(
            aggregate_people("median", Some("Age")),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn counting_distinct_values_uses_distinct_in_the_aggregate() {
        let chain = parse_chain(&format!(
            r#"{{
                "type": "aggregate",
                "function": "count",
                "source": {{
                    "type": "distinct",
                    "source": {{
                        "type": "select",
                        "source": {},
                        "selector": {{
                            "parameters": ["p"],
                            "body": {{
                                "type": "member",
                                "expression": {{ "type": "parameter", "name": "p" }},
                                "member": "Age"
                            }}
                        }}
                    }}
                }}
            }}"#,
            table("Person")
        ));
        let projection = bind_root(&chain).unwrap();
        let Expression::Aggregate(aggregate) = &projection.select.columns[0].expression else {
            panic!("expected an aggregate column");
        };
        assert!(aggregate.is_distinct);
        assert!(aggregate.argument.is_some());
    }

    #[test]
    fn counting_with_a_predicate_filters_first() {
        let chain = parse_chain(&format!(
            r#"{{
                "type": "aggregate",
                "function": "count",
                "source": {},
                "predicate": {{
                    "parameters": ["p"],
                    "body": {{
                        "type": "binary",
                        "operator": "greater_than",
                        "left": {{
                            "type": "member",
                            "expression": {{ "type": "parameter", "name": "p" }},
                            "member": "Age"
                        }},
                        "right": {{ "type": "constant", "value": 18 }}
                    }}
                }}
            }}"#,
            table("Person")
        ));
        let projection = bind_root(&chain).unwrap();
        let Some(sql::ast::From::Select(filtered)) = &projection.select.from else {
            panic!("expected a filtered source");
        };
        assert!(filtered.where_.is_some());
        assert_eq!(
            projection.select.columns[0].expression,
            sql::helpers::count_star()
        );
    }
}
