//! Type definitions of a SQL AST representation.
//!
//! Besides the nodes that are rendered to SQL, `Expression` carries a few shape nodes
//! (`Record`, `Grouping`, `Projection`) that only ever live inside projectors. The formatter
//! rejects them.

use std::sync::atomic::{AtomicU64, Ordering};

use query_engine_metadata::metadata::ScalarType;
use serde::Serialize;

static NEXT_TABLE_ALIAS: AtomicU64 = AtomicU64::new(0);

/// aliases that we give to relations.
///
/// An alias is an identity token: two aliases are equal only if one is a copy of the other.
/// Display names are assigned when the tree is converted to SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableAlias {
    unique_index: u64,
}

impl TableAlias {
    /// Issue a fresh alias. Never returns the same token twice within a process.
    #[allow(clippy::new_without_default)]
    pub fn new() -> TableAlias {
        TableAlias {
            unique_index: NEXT_TABLE_ALIAS.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn unique_index(&self) -> u64 {
        self.unique_index
    }
}

/// A database schema name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(pub String);

/// A database table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(pub String);

/// A reference to a table. Used when we want to query it,
/// for example in a FROM clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableReference {
    pub schema: SchemaName,
    pub table: TableName,
}

/// A column name, either of a database column or of a column we declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnName(pub String);

/// A single entry of a select list.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDeclaration {
    /// Empty only for anonymous aggregate-only projections.
    pub name: ColumnName,
    pub expression: Expression,
    pub r#type: ScalarType,
}

/// A SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub alias: TableAlias,
    pub columns: Vec<ColumnDeclaration>,
    /// Absent only for a single-row value select.
    pub from: Option<From>,
    pub where_: Option<Expression>,
    pub order_by: Vec<OrderByElement>,
    pub group_by: Vec<Expression>,
    pub is_distinct: bool,
    pub skip: Option<Expression>,
    pub take: Option<Expression>,
    /// Read `order_by` with every direction flipped.
    pub is_reverse: bool,
}

impl Select {
    /// The ordering the select actually applies, with `is_reverse` taken into account.
    pub fn ordering(&self) -> Vec<OrderByElement> {
        self.order_by
            .iter()
            .map(|element| OrderByElement {
                target: element.target.clone(),
                direction: if self.is_reverse {
                    element.direction.reversed()
                } else {
                    element.direction
                },
            })
            .collect()
    }
}

/// A FROM clause
#[derive(Debug, Clone, PartialEq)]
pub enum From {
    /// Select from a table reference
    Table {
        reference: TableReference,
        alias: TableAlias,
    },
    /// Select from a subquery, addressed by the subquery's own alias
    Select(Box<Select>),
    /// Select from a join of two sources
    Join(Box<Join>),
}

/// A JOIN clause
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinType,
    pub left: From,
    pub right: From,
    pub condition: Option<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    CrossJoin,
    InnerJoin,
    /// The right side may reference the left row.
    CrossApply,
    /// As `CrossApply`, keeping left rows without a match.
    OuterApply,
    LeftOuterJoin,
}

/// A single element in an ORDER BY clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByElement {
    pub target: Expression,
    pub direction: OrderByDirection,
}

/// A direction for a single ORDER BY element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByDirection {
    Asc,
    Desc,
}

impl OrderByDirection {
    pub fn reversed(self) -> OrderByDirection {
        match self {
            OrderByDirection::Asc => OrderByDirection::Desc,
            OrderByDirection::Desc => OrderByDirection::Asc,
        }
    }
}

/// A reference to a column of an aliased relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnReference {
    pub table: TableAlias,
    pub name: ColumnName,
    pub r#type: ScalarType,
}

/// A scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A column reference
    Column(ColumnReference),
    /// An irreducible value, rendered inline
    Value { value: Value, r#type: ScalarType },
    /// A value living outside the query, not yet turned into a parameter
    External(ExternalValue),
    /// A named parameter
    NamedValue(NamedValue),
    /// AND clause
    And {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// OR clause
    Or {
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// NOT clause
    Not(Box<Expression>),
    /// A binary operation on two scalar expression
    BinaryOperation {
        left: Box<Expression>,
        operator: BinaryOperator,
        right: Box<Expression>,
    },
    /// An unary operation on a scalar expression
    UnaryOperation {
        expression: Box<Expression>,
        operator: UnaryOperator,
    },
    /// CASE WHEN condition THEN then ELSE otherwise END
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// A scalar function call
    FunctionCall {
        function: Function,
        args: Vec<Expression>,
        r#type: ScalarType,
    },
    Cast {
        expression: Box<Expression>,
        r#type: ScalarType,
    },
    Aggregate(Aggregate),
    /// A subquery producing exactly one column and at most one row
    ScalarSubquery {
        select: Box<Select>,
        r#type: ScalarType,
    },
    /// An EXISTS clause
    Exists { select: Box<Select> },
    /// `expression IN (values...)`
    In {
        expression: Box<Expression>,
        values: Vec<Expression>,
    },
    /// `expression IN (SELECT ...)`
    InSelect {
        expression: Box<Expression>,
        select: Box<Select>,
    },
    /// A record built from named fields. Projector only.
    Record(Record),
    /// A group: its key and the correlated sequence of its elements. Projector only.
    Grouping {
        key: Box<Expression>,
        elements: Box<Projection>,
    },
    /// A nested sequence. Projector only.
    Projection(Box<Projection>),
}

/// An aggregate function application.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// `None` counts all rows.
    pub argument: Option<Box<Expression>>,
    pub is_distinct: bool,
    pub r#type: ScalarType,
}

/// The closed set of aggregate functions we know how to spell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    LongCount,
    Sum,
    Min,
    Max,
    Average,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 6] = [
        AggregateFunction::Count,
        AggregateFunction::LongCount,
        AggregateFunction::Sum,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::Average,
    ];

    /// The name used for this aggregate in operator chains and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::LongCount => "long_count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Average => "average",
        }
    }

    pub fn from_name(name: &str) -> Option<AggregateFunction> {
        Self::ALL.into_iter().find(|function| function.name() == name)
    }

    /// Aggregates that count rows rather than combine values.
    pub fn is_count(&self) -> bool {
        matches!(self, AggregateFunction::Count | AggregateFunction::LongCount)
    }
}

/// A record built from named fields, like an entity row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub type_name: Option<String>,
    pub fields: Vec<(String, Expression)>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&Expression> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, expression)| expression)
    }
}

/// A value supplied from outside the query, reached through `root` and then `path`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalValue {
    pub root: String,
    pub path: Vec<String>,
    pub value: serde_json::Value,
    pub r#type: ScalarType,
}

/// A named parameter, created only when parameterizing a bound tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: String,
    pub r#type: ScalarType,
    pub source: ParamValue,
}

/// Where the value of a named parameter comes from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParamValue {
    /// A literal that appeared in the query
    Literal { value: Value },
    /// A value read from outside the query
    External {
        root: String,
        path: Vec<String>,
        value: serde_json::Value,
    },
}

/// Value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i64),
    Float8(f64),
    String(String),
}

impl Value {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int8(_) | Value::Float8(_))
    }
}

/// Represents a binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Like,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Concatenate,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equals
                | BinaryOperator::NotEquals
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqualTo
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqualTo
                | BinaryOperator::Like
        )
    }
}

/// An unary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    IsNull,
    IsNotNull,
    Negate,
}

/// A scalar function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Function {
    Coalesce,
    Upper,
    Lower,
    Length,
    Trim,
    Abs,
    Round,
}

/// A relational select together with how to read results out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub select: Select,
    /// How to build one output item from one row of `select`.
    pub projector: Expression,
    /// How to collapse all rows into one item, if the result is not a sequence.
    pub aggregator: Option<Aggregator>,
}

/// How a row sequence collapses into a single result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregator {
    /// Exactly one row holding exactly one value.
    SingleValue,
    First { or_default: bool },
    Single { or_default: bool },
    Last { or_default: bool },
}

impl Expression {
    /// Does this expression produce a truth value, as opposed to a value that happens to be
    /// boolean?
    pub fn is_predicate(&self) -> bool {
        match self {
            Expression::And { .. }
            | Expression::Or { .. }
            | Expression::Not(_)
            | Expression::Exists { .. }
            | Expression::In { .. }
            | Expression::InSelect { .. } => true,
            Expression::BinaryOperation { operator, .. } => operator.is_comparison(),
            Expression::UnaryOperation { operator, .. } => {
                matches!(operator, UnaryOperator::IsNull | UnaryOperator::IsNotNull)
            }
            _ => false,
        }
    }

    /// Shapes only exist inside projectors and never become SQL.
    pub fn is_shape(&self) -> bool {
        matches!(
            self,
            Expression::Record(_) | Expression::Grouping { .. } | Expression::Projection(_)
        )
    }

    /// The storage type this expression evaluates to. Shapes have none.
    pub fn scalar_type(&self) -> Option<ScalarType> {
        match self {
            Expression::Column(ColumnReference { r#type, .. })
            | Expression::Value { r#type, .. }
            | Expression::External(ExternalValue { r#type, .. })
            | Expression::NamedValue(NamedValue { r#type, .. })
            | Expression::FunctionCall { r#type, .. }
            | Expression::Cast { r#type, .. }
            | Expression::Aggregate(Aggregate { r#type, .. })
            | Expression::ScalarSubquery { r#type, .. } => Some(*r#type),
            Expression::BinaryOperation {
                left,
                operator,
                right,
            } => {
                if operator.is_comparison() {
                    Some(ScalarType::Boolean)
                } else {
                    left.scalar_type().or_else(|| right.scalar_type())
                }
            }
            Expression::UnaryOperation {
                expression,
                operator,
            } => match operator {
                UnaryOperator::Negate => expression.scalar_type(),
                UnaryOperator::IsNull | UnaryOperator::IsNotNull => Some(ScalarType::Boolean),
            },
            Expression::Conditional {
                then, otherwise, ..
            } => then.scalar_type().or_else(|| otherwise.scalar_type()),
            Expression::And { .. }
            | Expression::Or { .. }
            | Expression::Not(_)
            | Expression::Exists { .. }
            | Expression::In { .. }
            | Expression::InSelect { .. } => Some(ScalarType::Boolean),
            Expression::Record(_) | Expression::Grouping { .. } | Expression::Projection(_) => {
                None
            }
        }
    }
}
