//! Errors for query translation.

use query_engine_sql::sql;

/// A type for translation errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// An operator or node the translation does not know how to express.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),
    /// The chain (or the translation itself) broke an expectation that must always hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("type mismatch: cannot use {found} as {expected}")]
    TypeMismatch { found: String, expected: String },
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),
    #[error("column '{0}' not found in collection '{1}'")]
    ColumnNotFoundInCollection(String, String),
    #[error("placeholder '{0}' is not bound in this scope")]
    UnboundPlaceholder(String),
    #[error("unable to format the query: {0}")]
    Format(#[from] sql::convert::Error),
}

impl Error {
    pub(crate) fn type_mismatch(found: impl std::fmt::Display, expected: impl Into<String>) -> Error {
        Error::TypeMismatch {
            found: found.to_string(),
            expected: expected.into(),
        }
    }
}
