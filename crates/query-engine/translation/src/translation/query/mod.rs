//! Translate an operator chain into a SQL query.

pub mod aggregates;
pub mod expressions;
pub mod fields;
pub mod filtering;
pub mod grouping;
pub mod joins;
pub mod paging;
pub mod projection;
pub mod root;
pub mod set_operations;
pub mod sorting;
pub mod values;

use query_engine_metadata::metadata;
use query_engine_sql::sql;
use query_engine_sql::sql::dialect::Dialect;
use query_engine_sql::sql::execution_plan::TranslatedQuery;

use super::chain;
use super::error::Error;
use super::helpers::{Env, State};
use super::parameters::parameterize;

/// Translate a chain into SQL text for `dialect`, the parameters that text refers to, and how to
/// read the rows it returns back into results.
pub fn translate(
    metadata: &metadata::Metadata,
    dialect: &dyn Dialect,
    chain: &chain::Expression,
) -> Result<TranslatedQuery, Error> {
    let env = Env::new(metadata, dialect);
    let mut state = State::new();
    let projection = root::translate_root(&env, &mut state, chain)?;
    let (projection, params) = parameterize(projection);

    tracing::debug!("SQL AST: {:?}", projection.select);
    let sql = sql::convert::select_to_sql(&projection.select, dialect)?;
    tracing::info!(params = params.len(), "Generated SQL: {}", sql);

    Ok(TranslatedQuery {
        sql,
        params,
        projector: projection.projector,
        aggregator: projection.aggregator,
    })
}
