//! The on-disk configuration format, version 1.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::fs;

use query_engine_metadata::metadata;

use crate::dialect::DialectSettings;
use crate::error::{ParseConfigurationError, WriteParsedConfigurationError};

const CURRENT_VERSION: u32 = 1;
pub const CONFIGURATION_FILENAME: &str = "configuration.json";
const CONFIGURATION_JSONSCHEMA_FILENAME: &str = "schema.json";

/// Everything the translator needs to know about the target database.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ParsedConfiguration {
    // Which version of the configuration format are we using
    pub version: u32,
    #[serde(default)]
    pub metadata: metadata::Metadata,
    #[serde(default)]
    pub dialect: DialectSettings,
}

impl ParsedConfiguration {
    pub fn empty() -> Self {
        ParsedConfiguration {
            version: CURRENT_VERSION,
            metadata: metadata::Metadata::empty(),
            dialect: DialectSettings::default(),
        }
    }
}

/// The JSON schema of the configuration file.
pub fn generate_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ParsedConfiguration)
}

/// Parse the configuration format from a directory.
pub async fn parse_configuration(
    configuration_dir: impl AsRef<Path>,
) -> Result<ParsedConfiguration, ParseConfigurationError> {
    let configuration_file = configuration_dir.as_ref().join(CONFIGURATION_FILENAME);

    let configuration_file_contents =
        fs::read_to_string(&configuration_file)
            .await
            .map_err(|err| {
                ParseConfigurationError::IoErrorButStringified(format!(
                    "{}: {}",
                    &configuration_file.display(),
                    err
                ))
            })?;

    let parsed_config: ParsedConfiguration = serde_json::from_str(&configuration_file_contents)
        .map_err(|error| ParseConfigurationError::ParseError {
            file_path: configuration_file.clone(),
            line: error.line(),
            column: error.column(),
            message: error.to_string(),
        })?;

    if parsed_config.version != CURRENT_VERSION {
        return Err(ParseConfigurationError::UnsupportedVersion(
            parsed_config.version,
        ));
    }

    tracing::info!(
        tables = parsed_config.metadata.tables.0.len(),
        "parsed configuration from {}",
        configuration_file.display()
    );

    Ok(parsed_config)
}

/// Write the parsed configuration into a directory on disk, alongside its JSON schema.
pub async fn write_parsed_configuration(
    parsed_config: &ParsedConfiguration,
    out_dir: impl AsRef<Path>,
) -> Result<(), WriteParsedConfigurationError> {
    let configuration_file = out_dir.as_ref().to_owned().join(CONFIGURATION_FILENAME);
    fs::create_dir_all(out_dir.as_ref()).await?;

    fs::write(
        configuration_file,
        serde_json::to_string_pretty(parsed_config)
            .map_err(|e| WriteParsedConfigurationError::IoError(e.into()))?
            + "\n",
    )
    .await?;

    let configuration_jsonschema_file_path = out_dir
        .as_ref()
        .to_owned()
        .join(CONFIGURATION_JSONSCHEMA_FILENAME);

    fs::write(
        &configuration_jsonschema_file_path,
        serde_json::to_string_pretty(&generate_schema())
            .map_err(|e| WriteParsedConfigurationError::IoError(e.into()))?
            + "\n",
    )
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_engine_metadata::metadata::ScalarType;

    const PERSON_CONFIGURATION: &str = r#"{
  "version": 1,
  "metadata": {
    "tables": {
      "Person": {
        "schema_name": "public",
        "table_name": "person",
        "columns": {
          "Age": { "name": "age", "type": "integer" }
        }
      }
    }
  },
  "dialect": {
    "identifier_quoting": "bracket",
    "parameter_prefix": "@",
    "paging": "top",
    "native_booleans": false,
    "supports_apply": true,
    "supports_subquery_outside_from": false,
    "supports_distinct_in_aggregate": true
  }
}"#;

    #[tokio::test]
    async fn parses_a_configuration_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIGURATION_FILENAME), PERSON_CONFIGURATION)
            .await
            .unwrap();

        let parsed = parse_configuration(dir.path()).await.unwrap();
        let person = parsed.metadata.tables.0.get("Person").unwrap();
        assert_eq!(person.table_name, "person");
        assert_eq!(
            person.columns.get("Age").unwrap().r#type,
            ScalarType::Integer
        );
        assert!(parsed.dialect.supports_apply);
        assert_eq!(parsed.dialect.string_type, ScalarType::Text);
    }

    #[tokio::test]
    async fn rejects_unknown_versions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIGURATION_FILENAME),
            r#"{ "version": 7 }"#,
        )
        .await
        .unwrap();

        let error = parse_configuration(dir.path()).await.unwrap_err();
        assert!(matches!(error, ParseConfigurationError::UnsupportedVersion(7)));
    }

    #[tokio::test]
    async fn reports_the_position_of_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIGURATION_FILENAME), "{\n  \"version\": }")
            .await
            .unwrap();

        match parse_configuration(dir.path()).await.unwrap_err() {
            ParseConfigurationError::ParseError { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn written_configuration_parses_back() {
        let dir = tempfile::tempdir().unwrap();
        let configuration = ParsedConfiguration::empty();
        write_parsed_configuration(&configuration, dir.path())
            .await
            .unwrap();

        assert!(dir.path().join(CONFIGURATION_JSONSCHEMA_FILENAME).exists());
        assert_eq!(
            parse_configuration(dir.path()).await.unwrap(),
            configuration
        );
    }

    #[test]
    fn the_schema_accepts_a_full_configuration() {
        let schema = serde_json::to_value(generate_schema()).unwrap();
        let compiled = jsonschema::JSONSchema::compile(&schema).unwrap();
        let instance: serde_json::Value = serde_json::from_str(PERSON_CONFIGURATION).unwrap();
        assert!(compiled.is_valid(&instance));
    }
}
