//! Execution and classification of table checks.

use super::compile::compile_table;
use crate::core::{CheckResult, ReadOnlySession};
use crate::logging::LogConfig;
use crate::schema::{CheckDefinition, TableDefinition};
use crate::security::quote_identifier;
use crate::sources::{LoadFailure, LoadOutcomes};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

/// Message on every check of a table that had load failures.
pub const LOAD_ERROR_SKIP_MESSAGE: &str = "Skipped due to load error";

/// All check results of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCheckResults {
    pub table: String,
    pub checks: Vec<CheckResult>,
    pub aggregate_checks: Vec<CheckResult>,
}

impl TableCheckResults {
    /// Primary results followed by aggregate results.
    pub fn all(&self) -> impl Iterator<Item = &CheckResult> {
        self.checks.iter().chain(self.aggregate_checks.iter())
    }

    /// True when any check is NG or ERROR.
    pub fn has_failure(&self) -> bool {
        self.all().any(|r| r.status.is_failure())
    }
}

/// Runs the compiled checks of each table on a read-only session.
pub struct CheckEngine<'a> {
    session: &'a ReadOnlySession,
    log: LogConfig,
    max_concurrency: usize,
}

impl<'a> CheckEngine<'a> {
    pub fn new(session: &'a ReadOnlySession) -> Self {
        Self {
            session,
            log: LogConfig::default(),
            max_concurrency: 1,
        }
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Number of tables evaluated at the same time.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Evaluates every table. Results keep the order of `tables`.
    pub async fn run_tables(
        &self,
        tables: &[&TableDefinition],
        outcomes: &LoadOutcomes,
    ) -> Vec<TableCheckResults> {
        stream::iter(
            tables
                .iter()
                .map(|def| self.run_table(def, outcomes.failures(&def.name))),
        )
        .buffered(self.max_concurrency)
        .collect()
        .await
    }

    /// Evaluates one table.
    ///
    /// With any load failure present no query runs and every check is
    /// SKIPPED. Otherwise each check runs in compile order.
    #[instrument(skip_all, fields(table = %def.name))]
    pub async fn run_table(
        &self,
        def: &TableDefinition,
        load_failures: &[LoadFailure],
    ) -> TableCheckResults {
        info!(table = %def.name, "Starting checks");
        let compiled = compile_table(def);
        let quoted = quote_identifier(&def.name);

        let (checks, aggregate_checks) = if load_failures.is_empty() {
            let mut checks = Vec::with_capacity(compiled.primary.len());
            for check in &compiled.primary {
                checks.push(self.execute(&def.name, check).await);
            }
            let mut aggregate = Vec::with_capacity(compiled.aggregate.len());
            for check in &compiled.aggregate {
                aggregate.push(self.execute(&def.name, check).await);
            }
            (checks, aggregate)
        } else {
            let skip = |check: &CheckDefinition| {
                warn!(
                    table = %def.name,
                    check.description = %check.description,
                    load_failures = load_failures.len(),
                    "Check skipped"
                );
                CheckResult::skipped(
                    &check.description,
                    check.resolve_query(&quoted),
                    LOAD_ERROR_SKIP_MESSAGE,
                )
            };
            (
                compiled.primary.iter().map(&skip).collect(),
                compiled.aggregate.iter().map(&skip).collect(),
            )
        };

        let results = TableCheckResults {
            table: def.name.clone(),
            checks,
            aggregate_checks,
        };
        info!(
            table = %def.name,
            checks = results.checks.len(),
            aggregate_checks = results.aggregate_checks.len(),
            failed = results.all().filter(|r| r.status.is_failure()).count(),
            "Checks completed"
        );
        results
    }

    /// Runs a single check against `table` and classifies the outcome.
    pub async fn execute(&self, table: &str, check: &CheckDefinition) -> CheckResult {
        let query = check.resolve_query(&quote_identifier(table));
        if self.log.log_check_queries {
            debug!(
                table,
                check.description = %check.description,
                query = %self.log.field(&query),
                "Executing check"
            );
        }

        match self.session.count(&query, &check.scalar_params()).await {
            Ok(count) => {
                let result =
                    CheckResult::from_count(&check.description, query, count, check.expect_zero);
                if result.status.is_failure() {
                    error!(
                        table,
                        check.description = %check.description,
                        result_count = count,
                        "Check failed"
                    );
                }
                result
            }
            Err(failure) => {
                error!(
                    table,
                    check.description = %check.description,
                    error = %self.log.field(&failure.message),
                    "Check execution error"
                );
                CheckResult::error(&check.description, query, failure)
            }
        }
    }
}
