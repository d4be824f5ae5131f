//! Table-level checks: rule compilation and execution.

pub mod compile;
pub mod engine;

pub use compile::{compile_table, CompiledChecks};
pub use engine::{CheckEngine, TableCheckResults, LOAD_ERROR_SKIP_MESSAGE};
