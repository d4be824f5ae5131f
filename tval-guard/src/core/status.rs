//! Status vocabulary shared by checks, tables and the export gate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    /// The pass condition holds
    Ok,
    /// The query ran and found violations
    Ng,
    /// The query itself failed to execute
    Error,
    /// The check was not run because its input is unreliable
    Skipped,
}

impl CheckStatus {
    /// Returns true if this is an Ok status.
    pub fn is_ok(&self) -> bool {
        matches!(self, CheckStatus::Ok)
    }

    /// Returns true for NG and ERROR, the statuses that make a table fail.
    pub fn is_failure(&self) -> bool {
        matches!(self, CheckStatus::Ng | CheckStatus::Error)
    }

    /// Returns true if this is a Skipped status.
    pub fn is_skipped(&self) -> bool {
        matches!(self, CheckStatus::Skipped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Ng => "NG",
            CheckStatus::Error => "ERROR",
            CheckStatus::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall status of one table after loading and checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TableStatus {
    Ok,
    Ng,
}

impl TableStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, TableStatus::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Ok => "OK",
            TableStatus::Ng => "NG",
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export outcome for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportStatus {
    /// Export is permitted (or was performed)
    Ok,
    /// Export was withheld by the gate
    Skipped,
    /// Export was attempted and failed
    Error,
}

impl ExportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportStatus::Ok => "OK",
            ExportStatus::Skipped => "SKIPPED",
            ExportStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
