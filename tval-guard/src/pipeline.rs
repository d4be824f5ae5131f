//! The `validate` batch run: definitions, load, checks, relations, gate.

use crate::aggregate::StatusAggregator;
use crate::checks::CheckEngine;
use crate::config::{discover_config, ProjectConfig};
use crate::core::LoadSession;
use crate::export::export_tables;
use crate::logging::LogConfig;
use crate::profiler::profile_table;
use crate::relations::RelationValidator;
use crate::report::{RunReport, TableReport};
use crate::resolver::resolve_load_order;
use crate::schema::{load_relations, load_table_definitions, SchemaModel};
use crate::sources::{load_all, LoadOptions};
use crate::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tracing::{info, instrument};

/// Inputs of a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Config file; discovered from the working directory when `None`
    pub config_path: Option<PathBuf>,
    /// Write Parquet files when the export gate is open
    pub export: bool,
    pub log: LogConfig,
}

impl RunOptions {
    pub fn new(config_path: Option<PathBuf>, export: bool) -> Self {
        Self {
            config_path,
            export,
            log: LogConfig::default(),
        }
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }
}

/// Locates the config file and runs the pipeline.
pub async fn run(options: RunOptions) -> Result<RunReport> {
    let cwd = std::env::current_dir()?;
    let path = discover_config(options.config_path.as_deref(), &cwd)?;
    info!(config = %path.display(), "tval execution started");
    let config = ProjectConfig::from_file(&path)?;
    run_with_config(&config, options.export, &options.log).await
}

/// Runs the pipeline for an already loaded configuration.
///
/// Definition problems abort before any table is created. Everything that
/// goes wrong with the data itself ends up in the returned report.
#[instrument(skip_all, fields(project = %config.project_root.display()))]
pub async fn run_with_config(
    config: &ProjectConfig,
    export: bool,
    log: &LogConfig,
) -> Result<RunReport> {
    let executed_at = Utc::now();
    let concurrency = config.concurrency();

    let tables = load_table_definitions(&config.schema_dir, &config.project_root)?;
    let relations = match &config.relations_path {
        Some(path) => load_relations(path)?,
        None => Vec::new(),
    };
    let model = SchemaModel::new(tables, relations)?;
    let ordered = resolve_load_order(model.tables())?;
    info!(
        tables = ordered.len(),
        relations = model.relations().len(),
        "Definitions loaded"
    );

    let session = LoadSession::new();
    let load_options = LoadOptions {
        fallback_encoding: config.fallback_encoding()?,
        verify_keys: config.verify_keys_after_load,
        log: log.clone(),
    };
    let outcomes = load_all(&session, &ordered, &load_options).await?;
    let session = session.into_read_only();

    let table_results = CheckEngine::new(&session)
        .with_log_config(log.clone())
        .with_max_concurrency(concurrency)
        .run_tables(&ordered, &outcomes)
        .await;

    let session_ref = &session;
    let table_reports: Vec<TableReport> = stream::iter(ordered.iter().zip(&table_results).map(
        |(def, results)| {
            let load = outcomes.get(&def.name).cloned().unwrap_or_default();
            async move {
                let report = TableReport::new(def, load, results.clone());
                if report.status.is_ok() {
                    let profiles = profile_table(session_ref, def).await;
                    report.with_profiles(profiles)
                } else {
                    report
                }
            }
        },
    ))
    .buffered(concurrency)
    .collect()
    .await;

    let relation_results = RelationValidator::new(&session)
        .with_policy(config.relation_skip_policy)
        .with_log_config(log.clone())
        .with_max_concurrency(concurrency)
        .validate(model.relations(), &outcomes, &table_results)
        .await;

    let decision = StatusAggregator::new().aggregate(&outcomes, &table_results, &relation_results);
    let mut report = RunReport::new(executed_at, table_reports, relation_results, decision);

    if export {
        let export_dir = config.export_dir();
        info!(dir = %export_dir.display(), "Export requested");
        let exports = export_tables(&session, &ordered, &report.export_decision, &export_dir).await;
        report = report.with_exports(exports);
    }

    report.write_json(&config.output_path)?;
    info!(
        passed = report.passed(),
        tables_ng = report.summary.tables_ng,
        relation_checks_ng = report.summary.relation_checks_ng,
        "tval execution completed"
    );
    Ok(report)
}
