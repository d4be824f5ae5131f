//! Table creation and file ingestion on the read-write session.

use super::encoding::{ensure_utf8, DecodeError, EncodingFallback};
use super::keys::verify_keys;
use super::outcome::{LoadFailure, LoadFailureKind, LoadOutcome, LoadOutcomes};
use super::spreadsheet::{read_first_sheet, SheetError};
use crate::core::{LoadSession, QueryFailure};
use crate::error::{Result, TvalError};
use crate::logging::LogConfig;
use crate::schema::{ColumnDefinition, TableDefinition};
use crate::security::{quote_identifier, quote_literal};
use arrow::datatypes::{DataType, Field, Schema};
use datafusion::common::TableReference;
use datafusion::datasource::MemTable;
use datafusion::prelude::{CsvReadOptions, ParquetReadOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Settings for the load phase.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Decoding applied when a CSV file is not valid UTF-8
    pub fallback_encoding: EncodingFallback,
    /// Verify primary, unique and foreign keys after each table is loaded
    pub verify_keys: bool,
    pub log: LogConfig,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            fallback_encoding: EncodingFallback::Disabled,
            verify_keys: true,
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Csv,
    Parquet,
    Xlsx,
}

/// Builds the `CREATE TABLE` statement for a definition.
///
/// Foreign keys are not declared; they are verified after loading.
pub fn create_table_sql(def: &TableDefinition) -> String {
    let mut parts: Vec<String> = def
        .columns
        .iter()
        .map(|c| {
            let mut column = format!("{} {}", quote_identifier(&c.name), c.data_type);
            if c.not_null {
                column.push_str(" NOT NULL");
            }
            column
        })
        .collect();

    let quote_all = |cols: &[String]| {
        cols.iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    };
    if !def.constraints.primary_key.is_empty() {
        parts.push(format!(
            "PRIMARY KEY ({})",
            quote_all(&def.constraints.primary_key)
        ));
    }
    for group in &def.constraints.unique {
        parts.push(format!("UNIQUE ({})", quote_all(group)));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(&def.name),
        parts.join(", ")
    )
}

/// Creates every table in load order. A rejected definition is fatal.
pub async fn create_tables(session: &LoadSession, ordered: &[&TableDefinition]) -> Result<()> {
    for def in ordered {
        session
            .execute(&create_table_sql(def))
            .await
            .map_err(|e| TvalError::invalid_definition(&def.name, e.message))?;
        info!(table = %def.name, "Created table");
    }
    Ok(())
}

/// Creates and loads every table, in the given order.
pub async fn load_all(
    session: &LoadSession,
    ordered: &[&TableDefinition],
    options: &LoadOptions,
) -> Result<LoadOutcomes> {
    create_tables(session, ordered).await?;
    let mut outcomes = LoadOutcomes::new();
    for def in ordered {
        let outcome = load_table(session, def, options).await;
        outcomes.insert(def.name.clone(), outcome);
    }
    Ok(outcomes)
}

/// Loads every data file of one table and verifies its keys.
#[instrument(skip_all, fields(table = %def.name))]
pub async fn load_table(
    session: &LoadSession,
    def: &TableDefinition,
    options: &LoadOptions,
) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();
    let source_dir = def.source_dir.display().to_string();

    let files = match list_files(&def.source_dir) {
        Ok(files) => files,
        Err(e) => {
            outcome.failures.push(LoadFailure::new(
                &source_dir,
                LoadFailureKind::Io,
                format!("IO error: {e}"),
            ));
            return outcome;
        }
    };

    if files.is_empty() {
        outcome.failures.push(LoadFailure::new(
            &source_dir,
            LoadFailureKind::NoFiles,
            format!("No files found: {source_dir}"),
        ));
        warn!(table = %def.name, source_dir = %source_dir, "No data files");
        return outcome;
    }

    for (index, path) in files.iter().enumerate() {
        let file = path.display().to_string();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let kind = match extension.as_str() {
            "csv" => FileKind::Csv,
            "parquet" => FileKind::Parquet,
            "xlsx" => FileKind::Xlsx,
            "xls" => {
                outcome.failures.push(LoadFailure::new(
                    &file,
                    LoadFailureKind::UnsupportedFormat,
                    format!(".{extension} files are not supported: {file}"),
                ));
                continue;
            }
            _ => {
                warn!(table = %def.name, file = %file, "Skipping file with unsupported extension");
                continue;
            }
        };

        if options.log.log_load_operations {
            info!(table = %def.name, file = %file, "Loading file");
        }
        let stage = format!("__tval_stage_{}_{index}", def.name);
        match insert_file(session, def, path, kind, &stage, options).await {
            Ok(rows) => {
                outcome.rows_loaded += rows;
                outcome.files_loaded.push(file.clone());
                if options.log.log_load_operations {
                    info!(table = %def.name, file = %file, rows, "Loaded file");
                }
            }
            Err(failure) => {
                error!(
                    table = %def.name,
                    file = %file,
                    kind = ?failure.kind,
                    error = %options.log.field(&failure.raw_message),
                    "File load failed"
                );
                outcome.failures.push(failure);
            }
        }
    }

    if options.verify_keys {
        outcome.failures.extend(verify_keys(session, def).await);
    }
    outcome
}

fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn select_expression(column: &ColumnDefinition) -> String {
    let qcol = quote_identifier(&column.name);
    match &column.format {
        Some(format) => {
            let parser = if column.base_type() == "DATE" {
                "to_date"
            } else {
                "to_timestamp"
            };
            format!(
                "CAST({parser}(CAST({qcol} AS VARCHAR), {}) AS {}) AS {qcol}",
                quote_literal(format),
                column.data_type
            )
        }
        None => format!("CAST({qcol} AS {}) AS {qcol}", column.data_type),
    }
}

/// Statement copying the staged file into the target table.
fn insert_sql(def: &TableDefinition, stage: &str) -> String {
    let columns = def
        .columns
        .iter()
        .map(select_expression)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} SELECT {columns} FROM {}",
        quote_identifier(&def.name),
        quote_identifier(stage)
    )
}

async fn insert_file(
    session: &LoadSession,
    def: &TableDefinition,
    path: &Path,
    kind: FileKind,
    stage: &str,
    options: &LoadOptions,
) -> std::result::Result<u64, LoadFailure> {
    let file = path.display().to_string();
    let column_names: Vec<String> = def.columns.iter().map(|c| c.name.clone()).collect();
    let ctx = session.context();
    let stage_ref = TableReference::bare(stage.to_string());

    // Keeps a transcoded copy alive until the insert has run.
    let mut _utf8 = None;

    let registered = match kind {
        FileKind::Csv => {
            let source = ensure_utf8(path, options.fallback_encoding).map_err(|e| match e {
                DecodeError::Io(io) => {
                    LoadFailure::new(&file, LoadFailureKind::Io, format!("IO error: {io}"))
                }
                DecodeError::Malformed(message) => {
                    LoadFailure::new(&file, LoadFailureKind::Encoding, message)
                }
            })?;
            let read_path = source.path().display().to_string();
            let extension = source
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{e}"))
                .unwrap_or_default();
            _utf8 = Some(source);

            // Every field is read as text; typing happens in the INSERT casts.
            let schema = Schema::new(
                def.columns
                    .iter()
                    .map(|c| Field::new(&c.name, DataType::Utf8, true))
                    .collect::<Vec<_>>(),
            );
            let read_options = CsvReadOptions::new()
                .has_header(true)
                .schema(&schema)
                .file_extension(&extension);
            ctx.register_csv(stage_ref.clone(), &read_path, read_options)
                .await
        }
        FileKind::Parquet => {
            let extension = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| format!(".{e}"))
                .unwrap_or_default();
            let read_options = ParquetReadOptions {
                file_extension: &extension,
                ..Default::default()
            };
            ctx.register_parquet(stage_ref.clone(), &file, read_options)
                .await
        }
        FileKind::Xlsx => {
            let batch = read_first_sheet(path, &column_names).map_err(|e| {
                let kind = match e {
                    SheetError::NoHeader | SheetError::ColumnCount { .. } => {
                        LoadFailureKind::ColumnMismatch
                    }
                    _ => LoadFailureKind::Io,
                };
                LoadFailure::new(&file, kind, e.to_string())
            })?;
            MemTable::try_new(batch.schema(), vec![vec![batch]])
                .and_then(|table| ctx.register_table(stage_ref.clone(), Arc::new(table)))
                .map(|_| ())
        }
    };

    if let Err(e) = registered {
        return Err(LoadFailure::classify(
            &file,
            QueryFailure::from(e).message,
            &column_names,
        ));
    }

    let inserted = session.count(&insert_sql(def, stage)).await;

    if let Err(e) = ctx.deregister_table(stage_ref) {
        warn!(table = %def.name, stage, error = %e, "Failed to drop staging table");
    }

    match inserted {
        Ok(rows) => Ok(u64::try_from(rows).unwrap_or_default()),
        Err(e) => Err(LoadFailure::classify(&file, e.message, &column_names)),
    }
}
