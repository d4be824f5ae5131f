//! Prelude for commonly used types and traits in tval-guard.

pub use crate::checks::{CheckEngine, TableCheckResults};
pub use crate::config::ProjectConfig;
pub use crate::core::{CheckResult, CheckStatus, ExportStatus, ReadOnlySession, TableStatus};
pub use crate::error::{Result, TvalError};
pub use crate::formatters::{FormatterConfig, ReportFormatter};
pub use crate::logging::LogConfig;
pub use crate::pipeline::{run, RunOptions};
pub use crate::report::RunReport;
