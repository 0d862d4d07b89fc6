//! Dialect settings: the formatting hooks and capability flags of the target database.

use std::collections::{BTreeMap, BTreeSet};

use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql::ast::AggregateFunction;
use query_engine_sql::sql::dialect::{Dialect, PagingStyle};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How identifiers are quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum IdentifierQuoting {
    /// `"name"`
    DoubleQuote,
    /// `[name]`
    Bracket,
    /// `` `name` ``
    Backtick,
}

impl IdentifierQuoting {
    fn delimiters(self) -> (char, char) {
        match self {
            IdentifierQuoting::DoubleQuote => ('"', '"'),
            IdentifierQuoting::Bracket => ('[', ']'),
            IdentifierQuoting::Backtick => ('`', '`'),
        }
    }
}

/// How result sets are paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum Paging {
    LimitOffset,
    Top,
    OffsetFetch,
}

impl From<Paging> for PagingStyle {
    fn from(paging: Paging) -> PagingStyle {
        match paging {
            Paging::LimitOffset => PagingStyle::LimitOffset,
            Paging::Top => PagingStyle::Top,
            Paging::OffsetFetch => PagingStyle::OffsetFetch,
        }
    }
}

/// Settings describing the SQL dialect queries are translated to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct DialectSettings {
    pub identifier_quoting: IdentifierQuoting,
    /// Prepended to a parameter's name to form its placeholder, e.g. `@` or `:`.
    pub parameter_prefix: String,
    pub paging: Paging,
    /// Whether predicates can be used as values and boolean columns as predicates.
    pub native_booleans: bool,
    /// Whether `CROSS APPLY`/`OUTER APPLY` exist. Otherwise lateral joins are emitted.
    pub supports_apply: bool,
    /// Whether `EXISTS`/`IN (SELECT ..)` may appear in a top-level select list.
    pub supports_subquery_outside_from: bool,
    pub supports_distinct_in_aggregate: bool,
    /// Storage type of string constants.
    #[serde(default = "default_string_type")]
    pub string_type: ScalarType,
    /// Spellings overriding the standard names of aggregate functions.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub aggregate_spellings: BTreeMap<String, String>,
    /// Aggregates the dialect cannot compute.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub disabled_aggregates: BTreeSet<String>,
    /// Type names `CAST` uses where the database's differ from the standard ones.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub type_names: BTreeMap<ScalarType, String>,
}

fn default_string_type() -> ScalarType {
    ScalarType::Text
}

impl Default for DialectSettings {
    fn default() -> Self {
        DialectSettings::postgres()
    }
}

impl DialectSettings {
    /// PostgreSQL.
    pub fn postgres() -> Self {
        DialectSettings {
            identifier_quoting: IdentifierQuoting::DoubleQuote,
            parameter_prefix: ":".to_string(),
            paging: Paging::LimitOffset,
            native_booleans: true,
            supports_apply: false,
            supports_subquery_outside_from: true,
            supports_distinct_in_aggregate: true,
            string_type: ScalarType::Text,
            aggregate_spellings: BTreeMap::new(),
            disabled_aggregates: BTreeSet::new(),
            type_names: BTreeMap::new(),
        }
    }

    /// Microsoft SQL Server.
    pub fn sql_server() -> Self {
        DialectSettings {
            identifier_quoting: IdentifierQuoting::Bracket,
            parameter_prefix: "@".to_string(),
            paging: Paging::Top,
            native_booleans: false,
            supports_apply: true,
            supports_subquery_outside_from: false,
            supports_distinct_in_aggregate: true,
            string_type: ScalarType::CharacterVarying,
            aggregate_spellings: BTreeMap::from([(
                AggregateFunction::LongCount.name().to_string(),
                "COUNT_BIG".to_string(),
            )]),
            disabled_aggregates: BTreeSet::new(),
            type_names: BTreeMap::from(
                [
                    (ScalarType::Boolean, "bit"),
                    (ScalarType::DoublePrecision, "float"),
                    (ScalarType::CharacterVarying, "nvarchar(max)"),
                    (ScalarType::Text, "nvarchar(max)"),
                    (ScalarType::Json, "nvarchar(max)"),
                    (ScalarType::TimeWithoutTimeZone, "time"),
                    (ScalarType::TimestampWithTimeZone, "datetimeoffset"),
                    (ScalarType::TimestampWithoutTimeZone, "datetime2"),
                    (ScalarType::Uuid, "uniqueidentifier"),
                ]
                .map(|(r#type, name)| (r#type, name.to_string())),
            ),
        }
    }
}

fn standard_spelling(function: AggregateFunction) -> &'static str {
    match function {
        AggregateFunction::Count | AggregateFunction::LongCount => "COUNT",
        AggregateFunction::Sum => "SUM",
        AggregateFunction::Min => "MIN",
        AggregateFunction::Max => "MAX",
        AggregateFunction::Average => "AVG",
    }
}

impl Dialect for DialectSettings {
    fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quoting.delimiters();
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    fn parameter_placeholder(&self, name: &str) -> String {
        format!("{}{name}", self.parameter_prefix)
    }

    fn constant_type(&self, value: &serde_json::Value) -> ScalarType {
        match value {
            serde_json::Value::Null => ScalarType::Any,
            serde_json::Value::Bool(_) => ScalarType::Boolean,
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(integer) if i32::try_from(integer).is_ok() => ScalarType::Integer,
                Some(_) => ScalarType::Bigint,
                None => ScalarType::DoublePrecision,
            },
            serde_json::Value::String(_) => self.string_type,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => ScalarType::Json,
        }
    }

    fn is_aggregate(&self, name: &str) -> bool {
        AggregateFunction::from_name(name).is_some() && !self.disabled_aggregates.contains(name)
    }

    fn aggregate_spelling(&self, function: AggregateFunction) -> String {
        self.aggregate_spellings
            .get(function.name())
            .cloned()
            .unwrap_or_else(|| standard_spelling(function).to_string())
    }

    fn cast_type_name(&self, r#type: ScalarType) -> String {
        self.type_names
            .get(&r#type)
            .cloned()
            .unwrap_or_else(|| r#type.to_string())
    }

    fn supports_subquery_outside_from(&self) -> bool {
        self.supports_subquery_outside_from
    }

    fn supports_distinct_in_aggregate(&self) -> bool {
        self.supports_distinct_in_aggregate
    }

    fn supports_apply(&self) -> bool {
        self.supports_apply
    }

    fn paging_style(&self) -> PagingStyle {
        self.paging.into()
    }

    fn native_booleans(&self) -> bool {
        self.native_booleans
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_quotes_are_doubled() {
        assert_eq!(
            DialectSettings::postgres().quote_identifier("we\"ird"),
            "\"we\"\"ird\""
        );
        assert_eq!(
            DialectSettings::sql_server().quote_identifier("a]b"),
            "[a]]b]"
        );
    }

    #[test]
    fn constants_get_storage_types() {
        let dialect = DialectSettings::sql_server();
        assert_eq!(
            dialect.constant_type(&serde_json::json!(18)),
            ScalarType::Integer
        );
        assert_eq!(
            dialect.constant_type(&serde_json::json!(10_000_000_000_i64)),
            ScalarType::Bigint
        );
        assert_eq!(
            dialect.constant_type(&serde_json::json!(1.5)),
            ScalarType::DoublePrecision
        );
        assert_eq!(
            dialect.constant_type(&serde_json::json!("x")),
            ScalarType::CharacterVarying
        );
    }

    #[test]
    fn cast_type_names_follow_the_dialect() {
        assert_eq!(
            DialectSettings::postgres().cast_type_name(ScalarType::TimestampWithoutTimeZone),
            "timestamp without time zone"
        );
        let sql_server = DialectSettings::sql_server();
        assert_eq!(
            sql_server.cast_type_name(ScalarType::TimestampWithoutTimeZone),
            "datetime2"
        );
        assert_eq!(sql_server.cast_type_name(ScalarType::Integer), "integer");
    }

    #[test]
    fn type_names_are_keyed_by_scalar_type() {
        let dialect: DialectSettings = serde_json::from_value(serde_json::json!({
            "identifier_quoting": "doubleQuote",
            "parameter_prefix": ":",
            "paging": "limitOffset",
            "native_booleans": true,
            "supports_apply": false,
            "supports_subquery_outside_from": true,
            "supports_distinct_in_aggregate": true,
            "type_names": { "double precision": "float8" }
        }))
        .unwrap();
        assert_eq!(dialect.cast_type_name(ScalarType::DoublePrecision), "float8");
        assert!(serde_json::from_value::<BTreeMap<ScalarType, String>>(
            serde_json::json!({ "decimal": "numeric" })
        )
        .is_err());
    }

    #[test]
    fn aggregates_can_be_respelled_and_disabled() {
        let mut dialect = DialectSettings::sql_server();
        assert_eq!(
            dialect.aggregate_spelling(AggregateFunction::LongCount),
            "COUNT_BIG"
        );
        assert_eq!(dialect.aggregate_spelling(AggregateFunction::Average), "AVG");
        assert!(dialect.is_aggregate("average"));
        dialect.disabled_aggregates.insert("average".to_string());
        assert!(!dialect.is_aggregate("average"));
        assert!(!dialect.is_aggregate("median"));
    }
}
