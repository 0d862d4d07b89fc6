//! Helpers for building sql::ast types in certain shapes and patterns.

use super::ast::*;
use query_engine_metadata::metadata::ScalarType;

// Empty clauses //

/// Build a select with the given alias and columns, and the rest empty.
pub fn simple_select(alias: TableAlias, columns: Vec<ColumnDeclaration>) -> Select {
    Select {
        alias,
        columns,
        from: None,
        where_: None,
        order_by: vec![],
        group_by: vec![],
        is_distinct: false,
        skip: None,
        take: None,
        is_reverse: false,
    }
}

/// Build a select of `columns` from `from`.
pub fn select_from(alias: TableAlias, columns: Vec<ColumnDeclaration>, from: From) -> Select {
    let mut select = simple_select(alias, columns);
    select.from = Some(from);
    select
}

/// A predicate that always holds, spelled `1 = 1` so it stays inline and works without native
/// booleans.
pub fn true_expr() -> Expression {
    equals(int_expr(1), int_expr(1))
}

/// A predicate that never holds: `1 = 0`.
pub fn false_expr() -> Expression {
    equals(int_expr(1), int_expr(0))
}

/// A `NULL` of unknown type.
pub fn null_expr() -> Expression {
    Expression::Value {
        value: Value::Null,
        r#type: ScalarType::Any,
    }
}

/// An inline integer literal.
pub fn int_expr(value: i64) -> Expression {
    Expression::Value {
        value: Value::Int8(value),
        r#type: ScalarType::Integer,
    }
}

// Columns //

/// Reference a column of an aliased relation.
pub fn make_column(table: TableAlias, name: &str, r#type: ScalarType) -> Expression {
    Expression::Column(ColumnReference {
        table,
        name: ColumnName(name.to_string()),
        r#type,
    })
}

/// Create column declarations using this function so we build everything in one place.
pub fn make_column_declaration(name: &str, expression: Expression) -> ColumnDeclaration {
    let r#type = expression.scalar_type().unwrap_or(ScalarType::Any);
    ColumnDeclaration {
        name: ColumnName(name.to_string()),
        expression,
        r#type,
    }
}

/// The alias under which a FROM source is addressed, when it has exactly one.
pub fn from_alias(from: &From) -> Option<TableAlias> {
    match from {
        From::Table { alias, .. } => Some(*alias),
        From::Select(select) => Some(select.alias),
        From::Join(_) => None,
    }
}

// Predicates //

pub fn and(left: Expression, right: Expression) -> Expression {
    Expression::And {
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn or(left: Expression, right: Expression) -> Expression {
    Expression::Or {
        left: Box::new(left),
        right: Box::new(right),
    }
}

pub fn not(expression: Expression) -> Expression {
    Expression::Not(Box::new(expression))
}

pub fn binary(left: Expression, operator: BinaryOperator, right: Expression) -> Expression {
    Expression::BinaryOperation {
        left: Box::new(left),
        operator,
        right: Box::new(right),
    }
}

pub fn equals(left: Expression, right: Expression) -> Expression {
    binary(left, BinaryOperator::Equals, right)
}

pub fn is_null(expression: Expression) -> Expression {
    Expression::UnaryOperation {
        expression: Box::new(expression),
        operator: UnaryOperator::IsNull,
    }
}

/// `(left IS NULL AND right IS NULL) OR left = right`.
///
/// Plain equality never matches NULL with NULL, which is wrong when correlating group keys.
pub fn null_safe_equals(left: Expression, right: Expression) -> Expression {
    or(
        and(is_null(left.clone()), is_null(right.clone())),
        equals(left, right),
    )
}

/// Fold a list of predicates with AND. `None` when the list is empty.
pub fn and_all(predicates: impl IntoIterator<Item = Expression>) -> Option<Expression> {
    predicates.into_iter().reduce(and)
}

/// Fold a list of predicates with OR. `None` when the list is empty.
pub fn or_all(predicates: impl IntoIterator<Item = Expression>) -> Option<Expression> {
    predicates.into_iter().reduce(or)
}

// Aggregates //

/// `COUNT(*)`.
pub fn count_star() -> Expression {
    Expression::Aggregate(Aggregate {
        function: AggregateFunction::Count,
        argument: None,
        is_distinct: false,
        r#type: ScalarType::Integer,
    })
}
