//! The run report handed to formatters and written to disk.

use crate::aggregate::{table_status, ExportDecision};
use crate::checks::TableCheckResults;
use crate::core::{CheckResult, CheckStatus, TableStatus};
use crate::export::ExportResult;
use crate::profiler::ColumnProfile;
use crate::schema::TableDefinition;
use crate::sources::LoadOutcome;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything the run learned about one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableReport {
    pub table: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub description: String,
    pub source_dir: PathBuf,
    pub column_count: usize,
    pub status: TableStatus,
    pub load: LoadOutcome,
    pub checks: Vec<CheckResult>,
    pub aggregate_checks: Vec<CheckResult>,
    pub profiles: Vec<ColumnProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportResult>,
}

impl TableReport {
    pub fn new(def: &TableDefinition, load: LoadOutcome, results: TableCheckResults) -> Self {
        let status = table_status(load.is_tainted(), &results);
        Self {
            table: def.name.clone(),
            description: def.description.clone(),
            source_dir: def.source_dir.clone(),
            column_count: def.columns.len(),
            status,
            load,
            checks: results.checks,
            aggregate_checks: results.aggregate_checks,
            profiles: Vec::new(),
            export: None,
        }
    }

    pub fn with_profiles(mut self, profiles: Vec<ColumnProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn all_checks(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().chain(self.aggregate_checks.iter())
    }
}

/// Status counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub tables_total: usize,
    pub tables_ok: usize,
    pub tables_ng: usize,
    pub relation_checks_total: usize,
    pub relation_checks_ok: usize,
    /// NG and ERROR relation checks
    pub relation_checks_ng: usize,
    pub relation_checks_skipped: usize,
}

impl RunSummary {
    pub fn compute(tables: &[TableReport], relation_checks: &[CheckResult]) -> Self {
        let count = |status: CheckStatus| {
            relation_checks
                .iter()
                .filter(|r| r.status == status)
                .count()
        };
        Self {
            tables_total: tables.len(),
            tables_ok: tables.iter().filter(|t| t.status.is_ok()).count(),
            tables_ng: tables.iter().filter(|t| !t.status.is_ok()).count(),
            relation_checks_total: relation_checks.len(),
            relation_checks_ok: count(CheckStatus::Ok),
            relation_checks_ng: count(CheckStatus::Ng) + count(CheckStatus::Error),
            relation_checks_skipped: count(CheckStatus::Skipped),
        }
    }
}

/// Result of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub executed_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
    pub relation_checks: Vec<CheckResult>,
    pub summary: RunSummary,
    pub export_decision: ExportDecision,
    /// Whether export was requested for this run
    pub export_requested: bool,
}

impl RunReport {
    pub fn new(
        executed_at: DateTime<Utc>,
        tables: Vec<TableReport>,
        relation_checks: Vec<CheckResult>,
        export_decision: ExportDecision,
    ) -> Self {
        let summary = RunSummary::compute(&tables, &relation_checks);
        Self {
            executed_at,
            tables,
            relation_checks,
            summary,
            export_decision,
            export_requested: false,
        }
    }

    /// Attaches export results to their table reports.
    pub fn with_exports(mut self, exports: Vec<ExportResult>) -> Self {
        self.export_requested = true;
        for export in exports {
            if let Some(table) = self.tables.iter_mut().find(|t| t.table == export.table) {
                table.export = Some(export);
            }
        }
        self
    }

    /// True when every table is OK and no relation check is NG or ERROR.
    pub fn passed(&self) -> bool {
        self.export_decision.export_allowed
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }

    /// Writes the report as pretty JSON, creating parent directories.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Report written");
        Ok(())
    }
}
