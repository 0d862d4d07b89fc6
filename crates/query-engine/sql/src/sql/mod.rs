//! The relational tree, its helpers, and its conversion to SQL text.

pub mod aggregates;
pub mod ast;
pub mod convert;
pub mod dialect;
pub mod execution_plan;
pub mod helpers;
pub mod string;
