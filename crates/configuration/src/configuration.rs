//! Configuration for the translator.

use query_engine_metadata::metadata;
use query_engine_sql::sql::ast::AggregateFunction;

use crate::dialect::DialectSettings;
use crate::error::MakeRuntimeConfigurationError;
use crate::version1::ParsedConfiguration;

/// The 'Configuration' type collects all the information necessary to translate queries.
///
/// Values of this type are produced from a 'ParsedConfiguration' using
/// 'make_runtime_configuration', which also checks the settings that serde cannot.
#[derive(Debug, Clone)]
pub struct Configuration {
    pub metadata: metadata::Metadata,
    pub dialect: DialectSettings,
}

/// Validate a parsed configuration and turn it into the runtime one.
pub fn make_runtime_configuration(
    parsed_config: ParsedConfiguration,
) -> Result<Configuration, MakeRuntimeConfigurationError> {
    let dialect = parsed_config.dialect;
    for name in dialect.aggregate_spellings.keys() {
        check_aggregate_name("aggregate_spellings", name)?;
    }
    for name in &dialect.disabled_aggregates {
        check_aggregate_name("disabled_aggregates", name)?;
    }
    for (table, info) in &parsed_config.metadata.tables.0 {
        for (field, column) in &info.columns {
            if column.name.is_empty() {
                return Err(MakeRuntimeConfigurationError::EmptyColumnName {
                    table: table.clone(),
                    column: field.clone(),
                });
            }
        }
    }
    Ok(Configuration {
        metadata: parsed_config.metadata,
        dialect,
    })
}

fn check_aggregate_name(
    setting: &'static str,
    name: &str,
) -> Result<(), MakeRuntimeConfigurationError> {
    match AggregateFunction::from_name(name) {
        Some(_) => Ok(()),
        None => Err(MakeRuntimeConfigurationError::UnknownAggregateFunction {
            setting,
            name: name.to_string(),
        }),
    }
}
