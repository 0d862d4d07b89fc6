//! Metadata information regarding the database and the entities mapped onto it.

pub mod database;

// re-export without modules
pub use database::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Metadata information.
///
/// This is the entity-to-table lookup the translation consumes. It is always passed in
/// explicitly; nothing in the query engine keeps a global registry of entities.
#[derive(Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct Metadata {
    #[serde(default)]
    pub tables: TablesInfo,
}

impl Metadata {
    pub fn empty() -> Self {
        Metadata {
            tables: TablesInfo::empty(),
        }
    }
}
