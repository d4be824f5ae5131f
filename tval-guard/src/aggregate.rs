//! Folding table and relationship statuses into the export decision.

use crate::checks::TableCheckResults;
use crate::core::{CheckResult, CheckStatus, ExportStatus, TableStatus};
use crate::sources::LoadOutcomes;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Message attached to every table when the export gate is closed.
pub const EXPORT_BLOCKED_MESSAGE: &str = "Skipped because tables with validation failures exist";

/// Export outcome for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableExportDecision {
    pub table: String,
    pub status: ExportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// The all-or-nothing export gate for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDecision {
    pub export_allowed: bool,
    pub tables: Vec<TableExportDecision>,
}

impl ExportDecision {
    pub fn status_for(&self, table: &str) -> Option<ExportStatus> {
        self.tables.iter().find(|t| t.table == table).map(|t| t.status)
    }
}

/// Overall status of a table: NG on any load failure or NG/ERROR check.
pub fn table_status(load_failed: bool, results: &TableCheckResults) -> TableStatus {
    if load_failed || results.has_failure() {
        TableStatus::Ng
    } else {
        TableStatus::Ok
    }
}

/// Whether a relationship check keeps the export gate open.
fn relation_passes(status: CheckStatus) -> bool {
    match status {
        CheckStatus::Ok | CheckStatus::Skipped => true,
        CheckStatus::Ng | CheckStatus::Error => false,
    }
}

/// Decides export for every table in one step.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusAggregator;

impl StatusAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Computes the table statuses from load outcomes and check results,
    /// then decides. Entries follow the order of `table_results`.
    pub fn aggregate(
        &self,
        outcomes: &LoadOutcomes,
        table_results: &[TableCheckResults],
        relation_results: &[CheckResult],
    ) -> ExportDecision {
        let statuses: Vec<(String, TableStatus)> = table_results
            .iter()
            .map(|r| (r.table.clone(), table_status(outcomes.is_tainted(&r.table), r)))
            .collect();
        self.decide(&statuses, relation_results)
    }

    /// Export is allowed only when every table is OK and no relationship
    /// check is NG or ERROR. Otherwise every table is SKIPPED.
    pub fn decide(
        &self,
        table_statuses: &[(String, TableStatus)],
        relation_results: &[CheckResult],
    ) -> ExportDecision {
        let tables_ok = table_statuses.iter().all(|(_, s)| s.is_ok());
        let relations_ok = relation_results.iter().all(|r| relation_passes(r.status));
        let export_allowed = tables_ok && relations_ok;

        let tables = table_statuses
            .iter()
            .map(|(table, _)| TableExportDecision {
                table: table.clone(),
                status: if export_allowed {
                    ExportStatus::Ok
                } else {
                    ExportStatus::Skipped
                },
                message: (!export_allowed).then(|| EXPORT_BLOCKED_MESSAGE.to_string()),
            })
            .collect();

        info!(
            export_allowed,
            tables_ng = table_statuses.iter().filter(|(_, s)| !s.is_ok()).count(),
            relation_checks_failed = relation_results
                .iter()
                .filter(|r| !relation_passes(r.status))
                .count(),
            "Export decision made"
        );
        ExportDecision {
            export_allowed,
            tables,
        }
    }
}
