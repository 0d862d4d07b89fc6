//! The formatting and capability hooks a SQL dialect supplies.

use super::ast::AggregateFunction;
use query_engine_metadata::metadata::ScalarType;

/// How a dialect limits and offsets result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingStyle {
    /// `LIMIT n OFFSET m`
    LimitOffset,
    /// `SELECT TOP (n)`, falling back to `OFFSET .. FETCH` when rows are skipped
    Top,
    /// `OFFSET m ROWS FETCH NEXT n ROWS ONLY`
    OffsetFetch,
}

/// Everything the translation needs to know about the target database.
pub trait Dialect {
    /// Quote a table, schema or column name.
    fn quote_identifier(&self, name: &str) -> String;

    /// The placeholder text standing for the named parameter in the SQL.
    fn parameter_placeholder(&self, name: &str) -> String;

    /// The storage type a constant of this shape is sent as.
    fn constant_type(&self, value: &serde_json::Value) -> ScalarType;

    /// Does this dialect accept the named operation as an aggregate?
    fn is_aggregate(&self, name: &str) -> bool;

    /// How to spell the aggregate in SQL.
    fn aggregate_spelling(&self, function: AggregateFunction) -> String;

    /// The type name a `CAST` to this type is written with.
    fn cast_type_name(&self, r#type: ScalarType) -> String;

    /// Can a subquery (`EXISTS`, `IN (SELECT ..)`) appear outside a FROM clause at the top level?
    fn supports_subquery_outside_from(&self) -> bool;

    /// Can aggregates take a `DISTINCT` argument?
    fn supports_distinct_in_aggregate(&self) -> bool;

    /// Does the dialect have `CROSS APPLY` / `OUTER APPLY`? Otherwise lateral joins are used.
    fn supports_apply(&self) -> bool;

    fn paging_style(&self) -> PagingStyle;

    /// Are predicates valid values (and boolean values valid predicates)?
    fn native_booleans(&self) -> bool;
}
