use std::fs;
use std::path::PathBuf;

use query_engine_sql::sql::execution_plan::TranslatedQuery;
use query_engine_translation::translation;

/// Translate the request of a goldenfile directory with the configuration stored beside it.
pub async fn translate(testname: &str) -> anyhow::Result<TranslatedQuery> {
    let directory = PathBuf::from("tests/goldenfiles").join(testname);

    let parsed_configuration = seqsql_configuration::parse_configuration(&directory).await?;
    let configuration = seqsql_configuration::make_runtime_configuration(parsed_configuration)?;

    let request = serde_json::from_str(&fs::read_to_string(directory.join("request.json"))?)?;

    Ok(translation::query::translate(
        &configuration.metadata,
        &configuration.dialect,
        &request,
    )?)
}

/// Translate a goldenfile request and compare the SQL and parameters with the expected ones.
pub async fn test_translation(testname: &str) -> anyhow::Result<()> {
    let directory = PathBuf::from("tests/goldenfiles").join(testname);
    let translated = translate(testname).await?;

    let expected_sql = fs::read_to_string(directory.join("expected.sql"))?;
    similar_asserts::assert_eq!(pretty(&expected_sql), pretty(&translated.sql));

    let expected_params: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(directory.join("expected_params.json"))?)?;
    similar_asserts::assert_eq!(expected_params, serde_json::to_value(&translated.params)?);

    Ok(())
}

fn pretty(sql: &str) -> String {
    sqlformat::format(
        sql.trim(),
        &sqlformat::QueryParams::None,
        sqlformat::FormatOptions::default(),
    )
}
