//! Detect aggregate use within a single select.

use super::ast::*;

/// Does `select` apply an aggregate in its own scope?
///
/// Only the select's columns, predicate and order terms are inspected. Subqueries, EXISTS
/// tests and nested projections are separate scopes and are not entered.
pub fn has_aggregates(select: &Select) -> bool {
    select
        .columns
        .iter()
        .any(|column| contains_aggregate(&column.expression))
        || select.where_.as_ref().is_some_and(contains_aggregate)
        || select
            .order_by
            .iter()
            .any(|element| contains_aggregate(&element.target))
}

/// Does `expression` apply an aggregate outside any subquery it contains?
pub fn contains_aggregate(expression: &Expression) -> bool {
    match expression {
        Expression::Aggregate(_) => true,
        Expression::Column(_)
        | Expression::Value { .. }
        | Expression::External(_)
        | Expression::NamedValue(_)
        | Expression::ScalarSubquery { .. }
        | Expression::Exists { .. }
        | Expression::InSelect { .. }
        | Expression::Grouping { .. }
        | Expression::Projection(_) => false,
        Expression::And { left, right }
        | Expression::Or { left, right }
        | Expression::BinaryOperation { left, right, .. } => {
            contains_aggregate(left) || contains_aggregate(right)
        }
        Expression::Not(expression)
        | Expression::UnaryOperation { expression, .. }
        | Expression::Cast { expression, .. } => contains_aggregate(expression),
        Expression::Conditional {
            condition,
            then,
            otherwise,
        } => {
            contains_aggregate(condition) || contains_aggregate(then) || contains_aggregate(otherwise)
        }
        Expression::FunctionCall { args, .. } => args.iter().any(contains_aggregate),
        Expression::In { expression, values } => {
            contains_aggregate(expression) || values.iter().any(contains_aggregate)
        }
        Expression::Record(record) => record
            .fields
            .iter()
            .any(|(_, expression)| contains_aggregate(expression)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::helpers;
    use query_engine_metadata::metadata::ScalarType;

    fn table_select() -> Select {
        let table_alias = TableAlias::new();
        helpers::select_from(
            TableAlias::new(),
            vec![helpers::make_column_declaration(
                "Age",
                helpers::make_column(table_alias, "Age", ScalarType::Integer),
            )],
            From::Table {
                reference: TableReference {
                    schema: SchemaName("public".to_string()),
                    table: TableName("Person".to_string()),
                },
                alias: table_alias,
            },
        )
    }

    #[test]
    fn plain_columns_are_not_aggregates() {
        assert!(!has_aggregates(&table_select()));
    }

    #[test]
    fn an_aggregate_column_is_detected() {
        let mut select = table_select();
        select
            .columns
            .push(helpers::make_column_declaration("n", helpers::count_star()));
        assert!(has_aggregates(&select));
    }

    #[test]
    fn an_aggregate_inside_an_order_term_is_detected() {
        let mut select = table_select();
        select.order_by.push(OrderByElement {
            target: helpers::binary(
                helpers::count_star(),
                BinaryOperator::Add,
                helpers::int_expr(1),
            ),
            direction: OrderByDirection::Asc,
        });
        assert!(has_aggregates(&select));
    }

    #[test]
    fn aggregates_inside_subqueries_do_not_count() {
        let mut inner = table_select();
        inner
            .columns
            .push(helpers::make_column_declaration("n", helpers::count_star()));
        let mut outer = table_select();
        outer.columns.push(helpers::make_column_declaration(
            "n",
            Expression::ScalarSubquery {
                select: Box::new(inner.clone()),
                r#type: ScalarType::Integer,
            },
        ));
        outer.where_ = Some(Expression::Exists {
            select: Box::new(inner),
        });
        assert!(!has_aggregates(&outer));
    }
}
