//! The operator-chain tree: a composable sequence query, as built by the surrounding query layer.
//!
//! A chain arrives as JSON. Every node is tagged by `"type"`; sequence operators take their
//! input through `source` and their per-element logic as lambdas.

use indexmap::IndexMap;
use query_engine_metadata::metadata::ScalarType;
use serde::{Deserialize, Serialize};

/// A node of the operator chain.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expression {
    // sources and scalars
    /// All rows of an entity.
    Table { entity: String },
    /// A literal. An array literal is an in-memory sequence.
    Constant { value: serde_json::Value },
    /// A value captured from the caller, sent as a parameter.
    External {
        name: String,
        value: serde_json::Value,
    },
    /// A lambda parameter.
    Parameter { name: String },
    /// Read a field of a row, a record, a group, or a captured value.
    Member {
        expression: Box<Expression>,
        member: String,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        operand: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Box<Expression>,
    },
    /// Build a record. Field order is kept.
    New {
        #[serde(default)]
        type_name: Option<String>,
        fields: IndexMap<String, Expression>,
    },
    /// A scalar function call.
    Call {
        function: String,
        arguments: Vec<Expression>,
    },
    Convert {
        expression: Box<Expression>,
        to: ScalarType,
    },

    // sequence operators
    Where {
        source: Box<Expression>,
        predicate: Lambda,
    },
    Select {
        source: Box<Expression>,
        selector: Lambda,
    },
    SelectMany {
        source: Box<Expression>,
        collection: Lambda,
        #[serde(default)]
        result: Option<Lambda>,
    },
    Join {
        outer: Box<Expression>,
        inner: Box<Expression>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    },
    GroupJoin {
        outer: Box<Expression>,
        inner: Box<Expression>,
        outer_key: Lambda,
        inner_key: Lambda,
        result: Lambda,
    },
    OrderBy {
        source: Box<Expression>,
        key: Lambda,
        #[serde(default)]
        descending: bool,
    },
    ThenBy {
        source: Box<Expression>,
        key: Lambda,
        #[serde(default)]
        descending: bool,
    },
    GroupBy {
        source: Box<Expression>,
        key: Lambda,
        #[serde(default)]
        element: Option<Lambda>,
        #[serde(default)]
        result: Option<Lambda>,
    },
    Distinct {
        source: Box<Expression>,
    },
    Skip {
        source: Box<Expression>,
        count: Box<Expression>,
    },
    Take {
        source: Box<Expression>,
        count: Box<Expression>,
    },
    /// First, Single or Last, optionally filtered and optionally defaulted.
    Element {
        source: Box<Expression>,
        kind: ElementKind,
        #[serde(default)]
        or_default: bool,
        #[serde(default)]
        predicate: Option<Lambda>,
    },
    Any {
        source: Box<Expression>,
        #[serde(default)]
        predicate: Option<Lambda>,
    },
    All {
        source: Box<Expression>,
        predicate: Lambda,
    },
    Contains {
        source: Box<Expression>,
        value: Box<Expression>,
    },
    /// Convert every element of a sequence.
    Cast {
        source: Box<Expression>,
        to: ScalarType,
    },
    Reverse {
        source: Box<Expression>,
    },
    Intersect {
        first: Box<Expression>,
        second: Box<Expression>,
    },
    Except {
        first: Box<Expression>,
        second: Box<Expression>,
    },
    /// An aggregate operation, named as the dialect names it (`count`, `sum`, ...).
    Aggregate {
        function: String,
        source: Box<Expression>,
        #[serde(default)]
        selector: Option<Lambda>,
        #[serde(default)]
        predicate: Option<Lambda>,
    },
    /// Only meaningful as the collection of a `select_many`, where it keeps unmatched rows.
    DefaultIfEmpty {
        source: Box<Expression>,
    },
}

/// An anonymous function over sequence elements.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Lambda {
    pub parameters: Vec<String>,
    pub body: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    First,
    Single,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Like,
    And,
    Or,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl Expression {
    /// The name of this node's kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Table { .. } => "table",
            Expression::Constant { .. } => "constant",
            Expression::External { .. } => "external",
            Expression::Parameter { .. } => "parameter",
            Expression::Member { .. } => "member",
            Expression::Binary { .. } => "binary",
            Expression::Unary { .. } => "unary",
            Expression::Conditional { .. } => "conditional",
            Expression::New { .. } => "new",
            Expression::Call { .. } => "call",
            Expression::Convert { .. } => "convert",
            Expression::Where { .. } => "where",
            Expression::Select { .. } => "select",
            Expression::SelectMany { .. } => "select_many",
            Expression::Join { .. } => "join",
            Expression::GroupJoin { .. } => "group_join",
            Expression::OrderBy { .. } => "order_by",
            Expression::ThenBy { .. } => "then_by",
            Expression::GroupBy { .. } => "group_by",
            Expression::Distinct { .. } => "distinct",
            Expression::Skip { .. } => "skip",
            Expression::Take { .. } => "take",
            Expression::Element { .. } => "element",
            Expression::Any { .. } => "any",
            Expression::All { .. } => "all",
            Expression::Contains { .. } => "contains",
            Expression::Cast { .. } => "cast",
            Expression::Reverse { .. } => "reverse",
            Expression::Intersect { .. } => "intersect",
            Expression::Except { .. } => "except",
            Expression::Aggregate { .. } => "aggregate",
            Expression::DefaultIfEmpty { .. } => "default_if_empty",
        }
    }
}
