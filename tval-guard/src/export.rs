//! Parquet export of validated tables.

use crate::aggregate::ExportDecision;
use crate::core::{ExportStatus, ReadOnlySession};
use crate::schema::TableDefinition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Result of exporting one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResult {
    pub table: String,
    pub status: ExportStatus,
    /// Written file, or directory for partitioned output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Writes `def` to `export_dir/<table>/`.
pub async fn export_table(
    session: &ReadOnlySession,
    def: &TableDefinition,
    export_dir: &Path,
) -> ExportResult {
    let dir = export_dir.join(&def.name);
    let output_path = if def.partition_by.is_empty() {
        dir.join(format!("{}.parquet", def.name))
    } else {
        dir.clone()
    };
    let failed = |message: String| ExportResult {
        table: def.name.clone(),
        status: ExportStatus::Error,
        output_path: Some(dir.clone()),
        message: Some(message),
    };

    if let Err(e) = std::fs::create_dir_all(&dir) {
        error!(table = %def.name, error = %e, "Export failed");
        return failed(e.to_string());
    }

    match session
        .export_parquet(&def.name, &dir, &def.partition_by)
        .await
    {
        Ok(()) => {
            info!(table = %def.name, path = %output_path.display(), "Table exported");
            ExportResult {
                table: def.name.clone(),
                status: ExportStatus::Ok,
                output_path: Some(output_path),
                message: None,
            }
        }
        Err(failure) => {
            error!(table = %def.name, error = %failure, "Export failed");
            failed(failure.message)
        }
    }
}

/// Exports every table the decision allows. Withheld tables are reported
/// as SKIPPED without touching the file system.
pub async fn export_tables(
    session: &ReadOnlySession,
    tables: &[&TableDefinition],
    decision: &ExportDecision,
    export_dir: &Path,
) -> Vec<ExportResult> {
    let mut results = Vec::with_capacity(tables.len());
    for def in tables {
        let entry = decision.tables.iter().find(|t| t.table == def.name);
        match entry {
            Some(entry) if entry.status == ExportStatus::Ok => {
                results.push(export_table(session, def, export_dir).await);
            }
            _ => {
                warn!(table = %def.name, "Export skipped");
                results.push(ExportResult {
                    table: def.name.clone(),
                    status: ExportStatus::Skipped,
                    output_path: None,
                    message: entry.and_then(|e| e.message.clone()),
                });
            }
        }
    }
    results
}
