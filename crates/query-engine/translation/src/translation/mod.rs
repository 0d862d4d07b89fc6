//! Translate an operator chain to SQL text, parameters and the shape of its results.

pub mod chain;
pub mod error;
pub mod helpers;
pub mod parameters;
pub mod query;
