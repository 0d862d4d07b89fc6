//! Handle scalar nodes: literals, captured values, parameters, member access, operators,
//! records, function calls and conversions.

use query_engine_metadata::metadata::{ScalarType, TypeFamily};
use query_engine_sql::sql;
use query_engine_sql::sql::ast::{Aggregator, Expression, Function, Projection, Record};

use super::paging::nested_element;
use super::projection::collect_tables;
use super::root::bind;
use super::values;
use crate::translation::chain;
use crate::translation::error::Error;
use crate::translation::helpers::{Env, Scope, State};

/// Bind a scalar (non-sequence) chain node.
pub fn bind_scalar(
    env: &Env,
    state: &mut State,
    scope: &Scope,
    chain: &chain::Expression,
) -> Result<Expression, Error> {
    match chain {
        chain::Expression::Constant { value } => values::translate_constant(env, value),
        chain::Expression::External { name, value } => {
            Ok(Expression::External(sql::ast::ExternalValue {
                root: name.clone(),
                path: vec![],
                value: value.clone(),
                r#type: env.dialect().constant_type(value),
            }))
        }
        chain::Expression::Parameter { name } => scope
            .lookup(name)
            .cloned()
            .ok_or_else(|| Error::UnboundPlaceholder(name.clone())),
        chain::Expression::Member { expression, member } => {
            let target = bind(env, state, scope, expression)?;
            translate_member(env, target, member)
        }
        chain::Expression::Binary {
            operator,
            left,
            right,
        } => {
            let left = bind(env, state, scope, left)?;
            let right = bind(env, state, scope, right)?;
            translate_binary(*operator, left, right)
        }
        chain::Expression::Unary { operator, operand } => {
            let operand = scalar(bind(env, state, scope, operand)?)?;
            match operator {
                chain::UnaryOperator::Not => Ok(sql::helpers::not(operand)),
                chain::UnaryOperator::Negate => {
                    check_family(&operand, TypeFamily::Numeric, "a number")?;
                    Ok(Expression::UnaryOperation {
                        expression: Box::new(operand),
                        operator: sql::ast::UnaryOperator::Negate,
                    })
                }
            }
        }
        chain::Expression::Conditional {
            condition,
            then,
            otherwise,
        } => Ok(Expression::Conditional {
            condition: Box::new(scalar(bind(env, state, scope, condition)?)?),
            then: Box::new(scalar(bind(env, state, scope, then)?)?),
            otherwise: Box::new(scalar(bind(env, state, scope, otherwise)?)?),
        }),
        chain::Expression::New { type_name, fields } => {
            let fields = fields
                .iter()
                .map(|(name, field)| Ok((name.clone(), bind(env, state, scope, field)?)))
                .collect::<Result<_, Error>>()?;
            Ok(Expression::Record(Record {
                type_name: type_name.clone(),
                fields,
            }))
        }
        chain::Expression::Call {
            function,
            arguments,
        } => {
            let arguments = arguments
                .iter()
                .map(|argument| scalar(bind(env, state, scope, argument)?))
                .collect::<Result<_, Error>>()?;
            translate_call(function, arguments)
        }
        chain::Expression::Convert { expression, to } => {
            translate_convert(bind(env, state, scope, expression)?, *to)
        }
        other => Err(Error::InvariantViolation(format!(
            "{} is not a scalar node",
            other.kind()
        ))),
    }
}

/// Read `member` of a bound expression.
pub fn translate_member(env: &Env, target: Expression, member: &str) -> Result<Expression, Error> {
    match target {
        Expression::Record(record) => record.field(member).cloned().ok_or_else(|| {
            Error::ColumnNotFoundInCollection(
                member.to_string(),
                record.type_name.unwrap_or_else(|| "record".to_string()),
            )
        }),
        Expression::Grouping { key, .. } => {
            if member == "Key" {
                Ok(*key)
            } else {
                Err(Error::ColumnNotFoundInCollection(
                    member.to_string(),
                    "group".to_string(),
                ))
            }
        }
        Expression::External(external) => {
            let value = match &external.value {
                serde_json::Value::Object(fields) => fields.get(member).cloned(),
                serde_json::Value::Array(items) => member
                    .parse::<usize>()
                    .ok()
                    .and_then(|index| items.get(index).cloned()),
                _ => None,
            }
            .unwrap_or(serde_json::Value::Null);
            let mut path = external.path;
            path.push(member.to_string());
            Ok(Expression::External(sql::ast::ExternalValue {
                r#type: env.dialect().constant_type(&value),
                root: external.root,
                path,
                value,
            }))
        }
        Expression::Projection(projection) if is_single_element(&projection) => {
            member_of_element(env, *projection, member)
        }
        Expression::Projection(_) => Err(Error::UnsupportedConstruct(format!(
            "member '{member}' of a sequence"
        ))),
        _ => Err(Error::UnsupportedConstruct(format!(
            "member '{member}' of a scalar value"
        ))),
    }
}

fn is_single_element(projection: &Projection) -> bool {
    matches!(
        projection.aggregator,
        Some(Aggregator::First { .. } | Aggregator::Single { .. } | Aggregator::Last { .. })
    )
}

/// A member of the one row a nested `first`, `single` or `last` yields, read by a subquery over
/// the same picked row.
fn member_of_element(env: &Env, projection: Projection, member: &str) -> Result<Expression, Error> {
    let projector = translate_member(env, projection.projector, member)?;
    nested_element(Projection {
        projector,
        ..projection
    })
}

/// Combine two bound operands.
pub fn translate_binary(
    operator: chain::BinaryOperator,
    left: Expression,
    right: Expression,
) -> Result<Expression, Error> {
    use chain::BinaryOperator as Op;
    use sql::ast::BinaryOperator as SqlOp;

    match operator {
        Op::Equal => return equate(left, right),
        Op::NotEqual => {
            return Ok(match (is_null_literal(&left), is_null_literal(&right)) {
                (false, true) => is_not_null(left),
                (true, false) => is_not_null(right),
                _ => sql::helpers::not(equate(left, right)?),
            })
        }
        _ => {}
    }

    let left = scalar(left)?;
    let right = scalar(right)?;
    let sql_operator = match operator {
        Op::And => return Ok(sql::helpers::and(left, right)),
        Op::Or => return Ok(sql::helpers::or(left, right)),
        Op::Equal => SqlOp::Equals,
        Op::NotEqual => SqlOp::NotEquals,
        Op::LessThan => SqlOp::LessThan,
        Op::LessThanOrEqual => SqlOp::LessThanOrEqualTo,
        Op::GreaterThan => SqlOp::GreaterThan,
        Op::GreaterThanOrEqual => SqlOp::GreaterThanOrEqualTo,
        Op::Like => SqlOp::Like,
        Op::Add if is_string(&left) || is_string(&right) => SqlOp::Concatenate,
        Op::Add => SqlOp::Add,
        Op::Subtract => SqlOp::Subtract,
        Op::Multiply => SqlOp::Multiply,
        Op::Divide => SqlOp::Divide,
        Op::Modulo => SqlOp::Modulo,
    };
    Ok(sql::helpers::binary(left, sql_operator, right))
}

/// Equality between two bound values. Records compare field by field, and a comparison with a
/// null literal becomes a null test.
pub fn equate(left: Expression, right: Expression) -> Result<Expression, Error> {
    match (left, right) {
        (Expression::Record(left), Expression::Record(right)) => {
            if left.fields.len() != right.fields.len() {
                return Err(Error::InvariantViolation(format!(
                    "cannot compare a record of {} fields with one of {}",
                    left.fields.len(),
                    right.fields.len()
                )));
            }
            let mut predicates = Vec::with_capacity(left.fields.len());
            for (name, left_field) in left.fields {
                let right_field = right.field(&name).cloned().ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "field '{name}' is missing from one side of a record comparison"
                    ))
                })?;
                predicates.push(equate(left_field, right_field)?);
            }
            Ok(sql::helpers::and_all(predicates).unwrap_or_else(sql::helpers::true_expr))
        }
        (Expression::Record(_), _) | (_, Expression::Record(_)) => Err(Error::InvariantViolation(
            "cannot compare a record with a single value".to_string(),
        )),
        (left, right) if is_null_literal(&right) => Ok(sql::helpers::is_null(scalar(left)?)),
        (left, right) if is_null_literal(&left) => Ok(sql::helpers::is_null(scalar(right)?)),
        (left, right) => Ok(sql::helpers::equals(scalar(left)?, scalar(right)?)),
    }
}

/// Flatten a (possibly nested) record key into its scalar parts, in field order.
pub fn key_leaves(key: &Expression) -> Vec<Expression> {
    match key {
        Expression::Record(record) => record
            .fields
            .iter()
            .flat_map(|(_, field)| key_leaves(field))
            .collect(),
        leaf => vec![leaf.clone()],
    }
}

/// Does `expression` have the same value on every row? Such keys neither group nor order.
pub fn is_constant(expression: &Expression) -> bool {
    let mut tables = vec![];
    collect_tables(expression, &mut tables);
    tables.is_empty()
        && !expression.is_shape()
        && !sql::aggregates::contains_aggregate(expression)
}

/// Apply a scalar function.
pub fn translate_call(function: &str, arguments: Vec<Expression>) -> Result<Expression, Error> {
    let expect_arguments = |count: std::ops::RangeInclusive<usize>| {
        if count.contains(&arguments.len()) {
            Ok(())
        } else {
            Err(Error::InvariantViolation(format!(
                "function '{function}' applied to {} arguments",
                arguments.len()
            )))
        }
    };
    let first_type = arguments
        .first()
        .and_then(Expression::scalar_type)
        .unwrap_or(ScalarType::Any);

    let (function, r#type) = match function {
        "coalesce" => {
            expect_arguments(1..=usize::MAX)?;
            (Function::Coalesce, first_type)
        }
        "upper" | "lower" | "trim" => {
            expect_arguments(1..=1)?;
            check_family(&arguments[0], TypeFamily::String, "a string")?;
            let function = match function {
                "upper" => Function::Upper,
                "lower" => Function::Lower,
                _ => Function::Trim,
            };
            (function, first_type)
        }
        "length" => {
            expect_arguments(1..=1)?;
            check_family(&arguments[0], TypeFamily::String, "a string")?;
            (Function::Length, ScalarType::Integer)
        }
        "abs" => {
            expect_arguments(1..=1)?;
            check_family(&arguments[0], TypeFamily::Numeric, "a number")?;
            (Function::Abs, first_type)
        }
        "round" => {
            expect_arguments(1..=2)?;
            check_family(&arguments[0], TypeFamily::Numeric, "a number")?;
            (Function::Round, first_type)
        }
        other => {
            return Err(Error::UnsupportedConstruct(format!("function '{other}'")));
        }
    };
    Ok(Expression::FunctionCall {
        function,
        args: arguments,
        r#type,
    })
}

/// Convert a bound value to another scalar type.
pub fn translate_convert(expression: Expression, to: ScalarType) -> Result<Expression, Error> {
    match expression.scalar_type() {
        None => Err(Error::type_mismatch("a record or sequence", to.to_string())),
        Some(from) if from == to => Ok(expression),
        Some(from) if from.reconciles_with(to) => Ok(Expression::Cast {
            expression: Box::new(expression),
            r#type: to,
        }),
        Some(from) => Err(Error::type_mismatch(from, to.to_string())),
    }
}

/// Reject shapes where a single value is needed.
pub fn scalar(expression: Expression) -> Result<Expression, Error> {
    if expression.is_shape() {
        Err(Error::type_mismatch("a record or sequence", "a single value"))
    } else {
        Ok(expression)
    }
}

fn check_family(expression: &Expression, family: TypeFamily, expected: &str) -> Result<(), Error> {
    match expression.scalar_type() {
        Some(ScalarType::Any) => Ok(()),
        Some(found) if found.family() == family => Ok(()),
        Some(found) => Err(Error::type_mismatch(found, expected)),
        None => Err(Error::type_mismatch("a record or sequence", expected)),
    }
}

fn is_string(expression: &Expression) -> bool {
    expression
        .scalar_type()
        .is_some_and(|r#type| r#type.family() == TypeFamily::String)
}

fn is_null_literal(expression: &Expression) -> bool {
    matches!(
        expression,
        Expression::Value {
            value: sql::ast::Value::Null,
            ..
        }
    )
}

fn is_not_null(expression: Expression) -> Expression {
    Expression::UnaryOperation {
        expression: Box::new(expression),
        operator: sql::ast::UnaryOperator::IsNotNull,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::query::test_support::{metadata, parse_chain};
    use query_engine_sql::sql::ast::TableAlias;
    use query_engine_sql::sql::helpers;

    fn bind_in_empty_scope(chain: &str) -> Result<Expression, Error> {
        let metadata = metadata();
        let dialect = seqsql_configuration::DialectSettings::postgres();
        let env = Env::new(&metadata, &dialect);
        bind(&env, &mut State::new(), &Scope::empty(), &parse_chain(chain))
    }

    #[test]
    fn adding_strings_concatenates() {
        let name = helpers::make_column(TableAlias::new(), "name", ScalarType::Text);
        let result = translate_binary(
            chain::BinaryOperator::Add,
            name.clone(),
            helpers::int_expr(1),
        )
        .unwrap();
        assert_eq!(
            result,
            helpers::binary(
                name,
                sql::ast::BinaryOperator::Concatenate,
                helpers::int_expr(1)
            )
        );
    }

    #[test]
    fn comparing_with_null_tests_for_null() {
        let age = helpers::make_column(TableAlias::new(), "age", ScalarType::Integer);
        assert_eq!(
            translate_binary(
                chain::BinaryOperator::Equal,
                age.clone(),
                helpers::null_expr()
            ),
            Ok(helpers::is_null(age.clone()))
        );
        assert_eq!(
            translate_binary(
                chain::BinaryOperator::NotEqual,
                helpers::null_expr(),
                age.clone()
            ),
            Ok(is_not_null(age))
        );
    }

    #[test]
    fn records_compare_field_by_field() {
        let alias = TableAlias::new();
        let record = |a: &str, b: &str| {
            Expression::Record(Record {
                type_name: None,
                fields: vec![
                    (
                        "A".to_string(),
                        helpers::make_column(alias, a, ScalarType::Integer),
                    ),
                    (
                        "B".to_string(),
                        helpers::make_column(alias, b, ScalarType::Integer),
                    ),
                ],
            })
        };
        assert_eq!(
            equate(record("a1", "b1"), record("a2", "b2")),
            Ok(helpers::and(
                helpers::equals(
                    helpers::make_column(alias, "a1", ScalarType::Integer),
                    helpers::make_column(alias, "a2", ScalarType::Integer)
                ),
                helpers::equals(
                    helpers::make_column(alias, "b1", ScalarType::Integer),
                    helpers::make_column(alias, "b2", ScalarType::Integer)
                ),
            ))
        );
        let short = Expression::Record(Record {
            type_name: None,
            fields: vec![("A".to_string(), helpers::int_expr(1))],
        });
        assert!(matches!(
            equate(record("a", "b"), short),
            Err(Error::InvariantViolation(_))
        ));
    }

    #[test]
    fn member_access_on_captured_values_extends_the_path() {
        let result = bind_in_empty_scope(
            r#"{
                "type": "member",
                "member": "min",
                "expression": {
                    "type": "member",
                    "member": "limits",
                    "expression": {
                        "type": "external",
                        "name": "filter",
                        "value": { "limits": { "min": 18 } }
                    }
                }
            }"#,
        )
        .unwrap();
        let Expression::External(external) = result else {
            panic!("expected a captured value");
        };
        assert_eq!(external.root, "filter");
        assert_eq!(external.path, vec!["limits".to_string(), "min".to_string()]);
        assert_eq!(external.value, serde_json::json!(18));
    }

    #[test]
    fn missing_record_fields_are_reported() {
        let result = bind_in_empty_scope(
            r#"{
                "type": "member",
                "member": "Height",
                "expression": {
                    "type": "new",
                    "type_name": "Person",
                    "fields": { "Age": { "type": "constant", "value": 1 } }
                }
            }"#,
        );
        assert_eq!(
            result,
            Err(Error::ColumnNotFoundInCollection(
                "Height".to_string(),
                "Person".to_string()
            ))
        );
    }

    fn order_with_person(kind: &str) -> String {
        format!(
            r#"{{
                "type": "select",
                "source": {{ "type": "table", "entity": "Order" }},
                "selector": {{
                    "parameters": ["o"],
                    "body": {{
                        "type": "member",
                        "member": "Name",
                        "expression": {{
                            "type": "element",
                            "kind": "{kind}",
                            "source": {{ "type": "table", "entity": "Person" }}
                        }}
                    }}
                }}
            }}"#
        )
    }

    #[test]
    fn members_of_a_nested_first_element_read_a_scalar_subquery() {
        let projection =
            crate::translation::query::test_support::bind_root(&parse_chain(&order_with_person(
                "first",
            )))
            .unwrap();
        assert_eq!(projection.select.columns.len(), 1);
        let Expression::ScalarSubquery { select, r#type } = &projection.select.columns[0].expression
        else {
            panic!("expected a scalar subquery");
        };
        assert_eq!(*r#type, ScalarType::Text);
        assert_eq!(select.columns.len(), 1);
        let Some(sql::ast::From::Select(picked)) = &select.from else {
            panic!("expected the picked row as the subquery's source");
        };
        assert_eq!(picked.take, Some(helpers::int_expr(1)));
    }

    #[test]
    fn members_of_the_last_element_of_an_unordered_sequence_are_unsupported() {
        let result = crate::translation::query::test_support::bind_root(&parse_chain(
            &order_with_person("last"),
        ));
        assert!(matches!(result, Err(Error::UnsupportedConstruct(_))));
    }

    #[test]
    fn unknown_functions_are_unsupported() {
        assert!(matches!(
            translate_call("soundex", vec![helpers::int_expr(1)]),
            Err(Error::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn string_functions_need_strings() {
        assert!(matches!(
            translate_call("upper", vec![helpers::int_expr(1)]),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn conversions_cast_within_a_family_only() {
        let age = helpers::make_column(TableAlias::new(), "age", ScalarType::Integer);
        assert_eq!(
            translate_convert(age.clone(), ScalarType::Integer),
            Ok(age.clone())
        );
        assert_eq!(
            translate_convert(age.clone(), ScalarType::Bigint),
            Ok(Expression::Cast {
                expression: Box::new(age.clone()),
                r#type: ScalarType::Bigint,
            })
        );
        assert!(matches!(
            translate_convert(age, ScalarType::Date),
            Err(Error::TypeMismatch { .. })
        ));
    }
}
