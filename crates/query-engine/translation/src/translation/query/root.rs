//! Bind chain nodes to SQL: the dispatcher every operator recurses through, and the root of a
//! chain, which decides how its result is read back.

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Aggregator, Expression, Projection, TableAlias};

use super::aggregates;
use super::expressions;
use super::fields;
use super::filtering;
use super::grouping;
use super::joins;
use super::paging;
use super::projection::{project_columns, ProjectedColumns};
use super::set_operations;
use super::sorting;
use super::values;
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// The column a root query producing a single value reads it from.
pub const VALUE_COLUMN: &str = "value";

/// Translate the root of a chain into a select and the shape of its result.
pub fn translate_root(
    env: &Env,
    state: &mut State,
    chain: &chain::Expression,
) -> Result<Projection, Error> {
    let scope = Scope::empty();
    match chain {
        chain::Expression::Aggregate {
            function,
            source,
            selector,
            predicate,
        } => aggregates::translate_root_aggregate(
            env,
            state,
            &scope,
            function,
            source,
            selector.as_ref(),
            predicate.as_ref(),
        ),
        chain::Expression::Any { .. }
        | chain::Expression::All { .. }
        | chain::Expression::Contains { .. } => {
            set_operations::translate_root_quantifier(env, state, &scope, chain)
        }
        chain::Expression::Element {
            source,
            kind,
            or_default,
            predicate,
        } => paging::translate_element(
            env,
            state,
            &scope,
            source,
            *kind,
            *or_default,
            predicate.as_ref(),
        ),
        _ => match bind(env, state, &scope, chain)? {
            Expression::Projection(projection) => Ok(*projection),
            Expression::Grouping { elements, .. } => Ok(*elements),
            value => Ok(single_row(value)),
        },
    }
}

/// A select with no FROM clause, producing one row holding `value`.
pub fn single_row(value: Expression) -> Projection {
    let alias = TableAlias::new();
    if value.is_shape() {
        let ProjectedColumns { columns, projector } = project_columns(value, alias, &[]);
        return Projection {
            select: sql::helpers::simple_select(alias, columns),
            projector,
            aggregator: Some(Aggregator::Single { or_default: false }),
        };
    }
    let r#type = value.scalar_type().unwrap_or(ScalarType::Any);
    Projection {
        select: sql::helpers::simple_select(
            alias,
            vec![sql::helpers::make_column_declaration(VALUE_COLUMN, value)],
        ),
        projector: sql::helpers::make_column(alias, VALUE_COLUMN, r#type),
        aggregator: Some(Aggregator::SingleValue),
    }
}

/// Bind any chain node. Sequence operators produce `Expression::Projection`.
pub fn bind(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    chain: &chain::Expression,
) -> Result<Expression, Error> {
    let sequence = |projection: Projection| -> Result<Expression, Error> {
        Ok(Expression::Projection(Box::new(projection)))
    };
    match chain {
        chain::Expression::Table { entity } => sequence(translate_table(env, entity)?),

        chain::Expression::Constant { .. }
        | chain::Expression::External { .. }
        | chain::Expression::Parameter { .. }
        | chain::Expression::Member { .. }
        | chain::Expression::Binary { .. }
        | chain::Expression::Unary { .. }
        | chain::Expression::Conditional { .. }
        | chain::Expression::New { .. }
        | chain::Expression::Call { .. }
        | chain::Expression::Convert { .. } => expressions::bind_scalar(env, state, scope, chain),

        chain::Expression::Where { source, predicate } => sequence(
            filtering::translate_where(env, state, scope, source, predicate)?,
        ),
        chain::Expression::Select { source, selector } => {
            sequence(fields::translate_select(env, state, scope, source, selector)?)
        }
        chain::Expression::Distinct { source } => {
            sequence(fields::translate_distinct(env, state, scope, source)?)
        }
        chain::Expression::Cast { source, to } => {
            sequence(fields::translate_cast(env, state, scope, source, *to)?)
        }
        chain::Expression::SelectMany {
            source,
            collection,
            result,
        } => sequence(joins::translate_select_many(
            env,
            state,
            scope,
            source,
            collection,
            result.as_ref(),
        )?),
        chain::Expression::Join {
            outer,
            inner,
            outer_key,
            inner_key,
            result,
        } => sequence(joins::translate_join(
            env,
            state,
            scope,
            &joins::JoinParts {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            },
        )?),
        chain::Expression::GroupJoin {
            outer,
            inner,
            outer_key,
            inner_key,
            result,
        } => sequence(joins::translate_group_join(
            env,
            state,
            scope,
            &joins::JoinParts {
                outer,
                inner,
                outer_key,
                inner_key,
                result,
            },
        )?),
        chain::Expression::OrderBy {
            source,
            key,
            descending,
        } => sequence(sorting::translate_order_by(
            env,
            state,
            scope,
            source,
            key,
            *descending,
        )?),
        chain::Expression::ThenBy {
            source,
            key,
            descending,
        } => sequence(sorting::translate_then_by(
            env,
            state,
            scope,
            source,
            key,
            *descending,
        )?),
        chain::Expression::Reverse { source } => {
            sequence(sorting::translate_reverse(env, state, scope, source)?)
        }
        chain::Expression::GroupBy {
            source,
            key,
            element,
            result,
        } => sequence(grouping::translate_group_by(
            env,
            state,
            scope,
            source,
            key,
            element.as_ref(),
            result.as_ref(),
        )?),
        chain::Expression::Skip { source, count } => {
            sequence(paging::translate_skip(env, state, scope, source, count)?)
        }
        chain::Expression::Take { source, count } => {
            sequence(paging::translate_take(env, state, scope, source, count)?)
        }
        chain::Expression::Element {
            source,
            kind,
            or_default,
            predicate,
        } => paging::translate_nested_element(
            env,
            state,
            scope,
            source,
            *kind,
            *or_default,
            predicate.as_ref(),
        ),
        chain::Expression::Any { source, predicate } => {
            set_operations::translate_any(env, state, scope, source, predicate.as_ref())
        }
        chain::Expression::All { source, predicate } => {
            set_operations::translate_all(env, state, scope, source, predicate)
        }
        chain::Expression::Contains { source, value } => {
            set_operations::translate_contains(env, state, scope, source, value)
        }
        chain::Expression::Intersect { first, second } => sequence(
            set_operations::translate_intersect(env, state, scope, first, second)?,
        ),
        chain::Expression::Except { first, second } => sequence(
            set_operations::translate_except(env, state, scope, first, second)?,
        ),
        chain::Expression::Aggregate {
            function,
            source,
            selector,
            predicate,
        } => aggregates::translate_nested_aggregate(
            env,
            state,
            scope,
            function,
            source,
            selector.as_ref(),
            predicate.as_ref(),
        ),
        chain::Expression::DefaultIfEmpty { .. } => Err(Error::UnsupportedConstruct(
            "default_if_empty outside the collection of a select_many".to_string(),
        )),
    }
}

/// A bound sequence: either rows of a query, or values known before the query runs.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Query(Projection),
    InMemory(Vec<Expression>),
}

/// Bind a node used as the input of a sequence operator.
pub fn bind_source(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    chain: &chain::Expression,
) -> Result<Source, Error> {
    if let chain::Expression::Constant {
        value: serde_json::Value::Array(items),
    } = chain
    {
        return Ok(Source::InMemory(
            items
                .iter()
                .map(|item| values::translate_constant(env, item))
                .collect::<Result<_, _>>()?,
        ));
    }
    match bind(env, state, scope, chain)? {
        Expression::Projection(projection) => Ok(Source::Query(*projection)),
        Expression::Grouping { elements, .. } => Ok(Source::Query(*elements)),
        Expression::External(external) => match &external.value {
            serde_json::Value::Array(items) => Ok(Source::InMemory(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        let mut path = external.path.clone();
                        path.push(index.to_string());
                        Expression::External(sql::ast::ExternalValue {
                            root: external.root.clone(),
                            path,
                            value: item.clone(),
                            r#type: env.dialect().constant_type(item),
                        })
                    })
                    .collect(),
            )),
            _ => Err(Error::UnsupportedConstruct(format!(
                "captured value '{}' used as a sequence",
                external.root
            ))),
        },
        _ => Err(Error::UnsupportedConstruct(format!(
            "{} used as a sequence",
            chain.kind()
        ))),
    }
}

/// Bind a node whose rows must come from the database.
pub fn bind_sequence(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    chain: &chain::Expression,
) -> Result<Projection, Error> {
    match bind_source(env, state, scope, chain)? {
        Source::Query(projection) => Ok(projection),
        Source::InMemory(_) => Err(Error::UnsupportedConstruct(format!(
            "in-memory sequence used as the source of a {}",
            chain.kind()
        ))),
    }
}

/// Bind the body of `lambda` with its parameters standing for `arguments`.
pub fn bind_lambda(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    lambda: &chain::Lambda,
    arguments: &[Expression],
) -> Result<Expression, Error> {
    if lambda.parameters.len() != arguments.len() {
        return Err(Error::InvariantViolation(format!(
            "lambda takes {} parameters but is applied to {}",
            lambda.parameters.len(),
            arguments.len()
        )));
    }
    let scope = lambda
        .parameters
        .iter()
        .zip(arguments)
        .fold(scope.clone(), |scope, (name, argument)| {
            scope.bind(name, argument.clone())
        });
    bind(env, state, &scope, &lambda.body)
}

/// All rows of an entity, with every mapped column selected under its field name.
pub fn translate_table(env: &Env, entity: &str) -> Result<Projection, Error> {
    let table = env.lookup_table(entity)?;
    let table_alias = TableAlias::new();
    let alias = TableAlias::new();

    let mut columns = Vec::with_capacity(table.columns.len());
    let mut fields = Vec::with_capacity(table.columns.len());
    for (field, column) in &table.columns {
        columns.push(sql::helpers::make_column_declaration(
            field,
            sql::helpers::make_column(table_alias, &column.name, column.r#type),
        ));
        fields.push((
            field.clone(),
            sql::helpers::make_column(alias, field, column.r#type),
        ));
    }

    let from = sql::ast::From::Table {
        reference: sql::ast::TableReference {
            schema: sql::ast::SchemaName(table.schema_name.clone()),
            table: sql::ast::TableName(table.table_name.clone()),
        },
        alias: table_alias,
    };
    Ok(Projection {
        select: sql::helpers::select_from(alias, columns, from),
        projector: Expression::Record(sql::ast::Record {
            type_name: Some(entity.to_string()),
            fields,
        }),
        aggregator: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::test_support::{metadata, parse_chain};
    use query_engine_sql::sql::dialect::Dialect;

    fn dialect() -> seqsql_configuration::DialectSettings {
        seqsql_configuration::DialectSettings::postgres()
    }

    #[test]
    fn tables_select_every_mapped_column() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        let projection = translate_table(&env, "Person").unwrap();
        let names: Vec<_> = projection
            .select
            .columns
            .iter()
            .map(|column| column.name.0.as_str())
            .collect();
        assert_eq!(names, vec!["Age", "Id", "Name"]);
        let Expression::Record(record) = projection.projector else {
            panic!("expected a record projector");
        };
        assert_eq!(record.type_name.as_deref(), Some("Person"));
    }

    #[test]
    fn unknown_entities_are_reported() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        assert_eq!(
            translate_table(&env, "Nobody"),
            Err(Error::CollectionNotFound("Nobody".to_string()))
        );
    }

    #[test]
    fn lambdas_check_their_arity() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        let lambda = chain::Lambda {
            parameters: vec!["a".to_string(), "b".to_string()],
            body: Box::new(chain::Expression::Parameter {
                name: "a".to_string(),
            }),
        };
        let result = bind_lambda(
            &env,
            &mut State::new(),
            &Scope::empty(),
            &lambda,
            &[sql::helpers::int_expr(1)],
        );
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn unbound_parameters_are_reported() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        let chain = parse_chain(r#"{ "type": "parameter", "name": "q" }"#);
        assert_eq!(
            bind(&env, &mut State::new(), &Scope::empty(), &chain),
            Err(Error::UnboundPlaceholder("q".to_string()))
        );
    }

    #[test]
    fn external_arrays_are_in_memory_sources() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        let chain = parse_chain(r#"{ "type": "external", "name": "ids", "value": [4, 7] }"#);
        let Source::InMemory(items) =
            bind_source(&env, &mut State::new(), &Scope::empty(), &chain).unwrap()
        else {
            panic!("expected an in-memory source");
        };
        assert_eq!(
            items[1],
            Expression::External(sql::ast::ExternalValue {
                root: "ids".to_string(),
                path: vec!["1".to_string()],
                value: serde_json::json!(7),
                r#type: dialect.constant_type(&serde_json::json!(7)),
            })
        );
    }

    #[test]
    fn scalars_are_not_sequences() {
        let metadata = metadata();
        let dialect = dialect();
        let env = Env::new(&metadata, &dialect);
        let chain = parse_chain(r#"{ "type": "constant", "value": 3 }"#);
        assert!(matches!(
            bind_source(&env, &mut State::new(), &Scope::empty(), &chain),
            Err(Error::UnsupportedConstruct(_))
        ));
    }
}
