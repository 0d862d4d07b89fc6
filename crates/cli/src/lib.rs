//! The command line front-end of the translator.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Subcommand;
use query_engine_metadata::metadata::ScalarType;
use query_engine_sql::sql::execution_plan::TranslatedQuery;
use query_engine_translation::translation;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Translate an operator chain into SQL and print it with its parameters.
    Translate {
        /// Directory holding `configuration.json`.
        #[arg(long, value_name = "DIRECTORY", env = "SEQSQL_CONFIGURATION")]
        configuration: PathBuf,
        /// JSON file holding the operator chain.
        #[arg(long, value_name = "FILE")]
        request: PathBuf,
        /// Lay the SQL out over indented lines.
        #[arg(long)]
        pretty: bool,
    },
    /// Print the JSON schema of `configuration.json`.
    Schema,
    /// List the scalar types a column may have.
    Types,
}

pub async fn run(command: Command, out: &mut impl Write) -> anyhow::Result<()> {
    match command {
        Command::Translate {
            configuration,
            request,
            pretty,
        } => {
            let translated = translate(&configuration, &request).await?;
            let sql = if pretty {
                sqlformat::format(
                    &translated.sql,
                    &sqlformat::QueryParams::None,
                    sqlformat::FormatOptions::default(),
                )
            } else {
                translated.sql
            };
            writeln!(out, "{sql}")?;
            writeln!(out)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&translated.params)?)?;
        }
        Command::Schema => {
            let schema = seqsql_configuration::generate_schema();
            writeln!(out, "{}", serde_json::to_string_pretty(&schema)?)?;
        }
        Command::Types => {
            for scalar_type in enum_iterator::all::<ScalarType>() {
                writeln!(out, "{scalar_type}")?;
            }
        }
    }
    Ok(())
}

/// Translate the chain in `request` with the configuration found in `configuration_dir`.
pub async fn translate(configuration_dir: &Path, request: &Path) -> anyhow::Result<TranslatedQuery> {
    let parsed = seqsql_configuration::parse_configuration(configuration_dir).await?;
    let configuration = seqsql_configuration::make_runtime_configuration(parsed)?;

    let contents = tokio::fs::read_to_string(request)
        .await
        .with_context(|| format!("reading {}", request.display()))?;
    let chain: translation::chain::Expression = serde_json::from_str(&contents)
        .with_context(|| format!("parsing the operator chain in {}", request.display()))?;
    tracing::debug!(operator = chain.kind(), "translating request");

    Ok(translation::query::translate(
        &configuration.metadata,
        &configuration.dialect,
        &chain,
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIGURATION: &str = r#"{
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
  }
}"#;

    const COUNT_PEOPLE: &str = r#"{
  "type": "aggregate",
  "function": "count",
  "source": { "type": "table", "entity": "Person" }
}"#;

    fn workspace(request: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(seqsql_configuration::CONFIGURATION_FILENAME),
            CONFIGURATION,
        )
        .unwrap();
        let request_file = dir.path().join("request.json");
        std::fs::write(&request_file, request).unwrap();
        (dir, request_file)
    }

    async fn output(command: Command) -> String {
        let mut out = vec![];
        run(command, &mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn translates_a_request_file() {
        let (dir, request) = workspace(COUNT_PEOPLE);
        let printed = output(Command::Translate {
            configuration: dir.path().to_path_buf(),
            request,
            pretty: false,
        })
        .await;
        assert!(printed.starts_with("SELECT COUNT(*) AS \"value\""));
        assert!(printed.trim_end().ends_with("[]"));
    }

    #[tokio::test]
    async fn unknown_entities_are_reported() {
        let (dir, request) = workspace(r#"{ "type": "table", "entity": "Pet" }"#);
        let error = translate(dir.path(), &request).await.unwrap_err();
        assert!(error.to_string().contains("Pet"));
    }

    #[tokio::test]
    async fn malformed_requests_name_the_file() {
        let (dir, request) = workspace("{ \"type\": ");
        let error = translate(dir.path(), &request).await.unwrap_err();
        assert!(error.to_string().contains("request.json"));
    }

    #[tokio::test]
    async fn lists_every_scalar_type() {
        let printed = output(Command::Types).await;
        assert!(printed.lines().any(|line| line == "integer"));
        assert!(printed.lines().any(|line| line == "character varying"));
    }

    #[tokio::test]
    async fn prints_the_configuration_schema() {
        let printed = output(Command::Schema).await;
        let schema: serde_json::Value = serde_json::from_str(&printed).unwrap();
        assert!(schema["properties"]["dialect"].is_object());
    }
}
