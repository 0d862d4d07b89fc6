//! Describe what a translated query hands over to the layer that executes it.

use query_engine_metadata::metadata::ScalarType;
use serde::Serialize;

use super::ast;

/// The result of translating one operator chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    /// The SQL text to run.
    pub sql: String,
    /// Parameters referenced by the SQL, in the order they were created.
    pub params: Vec<Param>,
    /// How to build one output item from one result row.
    pub projector: ast::Expression,
    /// How to collapse the rows, when the query does not return a sequence.
    pub aggregator: Option<ast::Aggregator>,
}

/// A parameter for a parameterized query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Param {
    pub name: String,
    pub r#type: ScalarType,
    pub value: ast::ParamValue,
}

impl From<&ast::NamedValue> for Param {
    fn from(named_value: &ast::NamedValue) -> Param {
        Param {
            name: named_value.name.clone(),
            r#type: named_value.r#type,
            value: named_value.source.clone(),
        }
    }
}
