//! Cross-table relationship validation.
//!
//! Each relationship's cardinality maps to a fixed set of uniqueness and
//! referential checks. A relationship is never validated against a table
//! already known to be bad: the table verdicts computed from load outcomes
//! and table check results decide whether its checks run or are SKIPPED.

use crate::checks::compile::{referential_sql, uniqueness_sql};
use crate::checks::TableCheckResults;
use crate::core::{CheckResult, ReadOnlySession};
use crate::logging::LogConfig;
use crate::schema::{Cardinality, RelationDefinition, RelationEndpoint};
use crate::sources::LoadOutcomes;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{error, info, warn};

/// Which table problems disqualify a relationship from being checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationSkipPolicy {
    /// Skip when either table has a load failure or any NG/ERROR check
    #[default]
    AnyTableFailure,
    /// Skip only when either table has a load failure
    LoadFailureOnly,
}

/// What the table stages concluded about one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableVerdict {
    pub load_failed: bool,
    pub check_failed: bool,
}

/// Table verdicts by name. Tables without an entry count as clean.
#[derive(Debug, Clone, Default)]
pub struct TableVerdicts(HashMap<String, TableVerdict>);

impl TableVerdicts {
    pub fn from_results(outcomes: &LoadOutcomes, results: &[TableCheckResults]) -> Self {
        let mut verdicts: HashMap<String, TableVerdict> = outcomes
            .iter()
            .map(|(name, outcome)| {
                (
                    name.clone(),
                    TableVerdict {
                        load_failed: outcome.is_tainted(),
                        check_failed: false,
                    },
                )
            })
            .collect();
        for table in results {
            verdicts.entry(table.table.clone()).or_default().check_failed = table.has_failure();
        }
        Self(verdicts)
    }

    pub fn insert(&mut self, table: impl Into<String>, verdict: TableVerdict) {
        self.0.insert(table.into(), verdict);
    }

    pub fn get(&self, table: &str) -> TableVerdict {
        self.0.get(table).copied().unwrap_or_default()
    }
}

/// One generated relationship check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationCheck {
    pub description: String,
    pub query: String,
}

fn uniqueness(
    rel: &RelationDefinition,
    endpoint: &RelationEndpoint,
    one_side: bool,
) -> RelationCheck {
    let suffix = if one_side { " (1-side)" } else { "" };
    RelationCheck {
        description: format!(
            "[{}] {}({}) uniqueness{suffix}",
            rel.name,
            endpoint.table,
            endpoint.columns.join(", ")
        ),
        query: uniqueness_sql(&endpoint.table, &endpoint.columns, false),
    }
}

fn referential(
    rel: &RelationDefinition,
    source: &RelationEndpoint,
    target: &RelationEndpoint,
) -> RelationCheck {
    RelationCheck {
        description: format!(
            "[{}] {} -> {} referential integrity",
            rel.name, source.table, target.table
        ),
        query: referential_sql(&source.table, &source.columns, &target.table, &target.columns),
    }
}

/// Generates the checks for a relationship's cardinality.
///
/// | Cardinality | Checks |
/// |---|---|
/// | 1:1 | unique(from), unique(to), from -> to, to -> from |
/// | 1:N | unique(from), to -> from |
/// | N:1 | unique(to), from -> to |
/// | N:N | from -> to, to -> from |
pub fn compile_relation(rel: &RelationDefinition) -> Vec<RelationCheck> {
    let (from, to) = (&rel.from, &rel.to);
    match rel.cardinality {
        Cardinality::OneToOne => vec![
            uniqueness(rel, from, false),
            uniqueness(rel, to, false),
            referential(rel, from, to),
            referential(rel, to, from),
        ],
        Cardinality::OneToMany => vec![uniqueness(rel, from, true), referential(rel, to, from)],
        Cardinality::ManyToOne => vec![uniqueness(rel, to, true), referential(rel, from, to)],
        Cardinality::ManyToMany => vec![referential(rel, from, to), referential(rel, to, from)],
    }
}

/// Runs relationship checks on a read-only session.
pub struct RelationValidator<'a> {
    session: &'a ReadOnlySession,
    policy: RelationSkipPolicy,
    log: LogConfig,
    max_concurrency: usize,
}

impl<'a> RelationValidator<'a> {
    pub fn new(session: &'a ReadOnlySession) -> Self {
        Self {
            session,
            policy: RelationSkipPolicy::default(),
            log: LogConfig::default(),
            max_concurrency: 1,
        }
    }

    pub fn with_policy(mut self, policy: RelationSkipPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_log_config(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    /// Number of relationships evaluated at the same time.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Validates every relationship against the table outcomes.
    pub async fn validate(
        &self,
        relations: &[RelationDefinition],
        outcomes: &LoadOutcomes,
        table_results: &[TableCheckResults],
    ) -> Vec<CheckResult> {
        let verdicts = TableVerdicts::from_results(outcomes, table_results);
        self.run(relations, &verdicts).await
    }

    /// Runs all relationships. The flat result list follows definition order.
    pub async fn run(
        &self,
        relations: &[RelationDefinition],
        verdicts: &TableVerdicts,
    ) -> Vec<CheckResult> {
        info!(relations = relations.len(), "Starting relation checks");
        let per_relation: Vec<Vec<CheckResult>> = stream::iter(
            relations
                .iter()
                .map(|rel| self.run_relation(rel, verdicts)),
        )
        .buffered(self.max_concurrency)
        .collect()
        .await;
        let results: Vec<CheckResult> = per_relation.into_iter().flatten().collect();
        info!(
            checks = results.len(),
            failed = results.iter().filter(|r| r.status.is_failure()).count(),
            "Relation checks completed"
        );
        results
    }

    /// Runs or skips the checks of one relationship.
    pub async fn run_relation(
        &self,
        rel: &RelationDefinition,
        verdicts: &TableVerdicts,
    ) -> Vec<CheckResult> {
        let checks = compile_relation(rel);
        let reasons = self.skip_reasons(rel, verdicts);

        if !reasons.is_empty() {
            let message = format!("Skipped due to errors in: {}", reasons.join(", "));
            warn!(relation = %rel.name, reason = %message, "Relation checks skipped");
            return checks
                .into_iter()
                .map(|c| CheckResult::skipped(c.description, c.query, message.clone()))
                .collect();
        }

        let mut results = Vec::with_capacity(checks.len());
        for check in checks {
            let result = match self.session.count(&check.query, &[]).await {
                Ok(count) => {
                    let result =
                        CheckResult::from_count(&check.description, &check.query, count, true);
                    if result.status.is_failure() {
                        error!(
                            relation = %rel.name,
                            check.description = %check.description,
                            result_count = count,
                            "Relation check failed"
                        );
                    }
                    result
                }
                Err(failure) => {
                    error!(
                        relation = %rel.name,
                        check.description = %check.description,
                        error = %self.log.field(&failure.message),
                        "Relation check execution error"
                    );
                    CheckResult::error(check.description, check.query, failure)
                }
            };
            results.push(result);
        }
        results
    }

    fn skip_reasons(&self, rel: &RelationDefinition, verdicts: &TableVerdicts) -> Vec<String> {
        let mut tables = vec![rel.from.table.as_str()];
        if rel.to.table != rel.from.table {
            tables.push(rel.to.table.as_str());
        }

        let mut load_failed = Vec::new();
        let mut check_failed = Vec::new();
        for table in tables {
            let verdict = verdicts.get(table);
            if verdict.load_failed {
                load_failed.push(table.to_string());
            } else if verdict.check_failed && self.policy == RelationSkipPolicy::AnyTableFailure {
                check_failed.push(format!("{table} (check failed)"));
            }
        }
        load_failed.extend(check_failed);
        load_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CheckStatus;
    use arrow::array::{Int64Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use datafusion::datasource::MemTable;
    use datafusion::prelude::SessionContext;
    use std::sync::Arc;

    fn register(ctx: &SessionContext, name: &str, columns: &[(&str, Vec<Option<i64>>)]) {
        let schema = Arc::new(Schema::new(
            columns
                .iter()
                .map(|(c, _)| Field::new(*c, DataType::Int64, true))
                .collect::<Vec<_>>(),
        ));
        let arrays = columns
            .iter()
            .map(|(_, v)| Arc::new(Int64Array::from(v.clone())) as _)
            .collect();
        let batch = RecordBatch::try_new(schema.clone(), arrays).unwrap();
        let table = MemTable::try_new(schema, vec![vec![batch]]).unwrap();
        ctx.register_table(name, Arc::new(table)).unwrap();
    }

    /// users(1, 2, 3); orders reference 1, 1, 3 and one NULL.
    fn session(orphan: bool) -> ReadOnlySession {
        let ctx = SessionContext::new();
        register(&ctx, "users", &[("user_id", vec![Some(1), Some(2), Some(3)])]);
        let last = if orphan { Some(9) } else { None };
        register(
            &ctx,
            "orders",
            &[
                ("order_id", vec![Some(10), Some(11), Some(12), Some(13)]),
                ("user_id", vec![Some(1), Some(1), Some(3), last]),
            ],
        );
        ReadOnlySession::from_context(ctx)
    }

    fn relation(cardinality: Cardinality) -> RelationDefinition {
        RelationDefinition::new(
            "user_orders",
            cardinality,
            RelationEndpoint::new("users", ["user_id"]),
            RelationEndpoint::new("orders", ["user_id"]),
        )
    }

    #[test]
    fn test_cardinality_mapping() {
        let descriptions = |c| {
            compile_relation(&relation(c))
                .into_iter()
                .map(|c| c.description)
                .collect::<Vec<_>>()
        };
        assert_eq!(
            descriptions(Cardinality::OneToOne),
            vec![
                "[user_orders] users(user_id) uniqueness",
                "[user_orders] orders(user_id) uniqueness",
                "[user_orders] users -> orders referential integrity",
                "[user_orders] orders -> users referential integrity",
            ]
        );
        assert_eq!(
            descriptions(Cardinality::OneToMany),
            vec![
                "[user_orders] users(user_id) uniqueness (1-side)",
                "[user_orders] orders -> users referential integrity",
            ]
        );
        assert_eq!(
            descriptions(Cardinality::ManyToOne),
            vec![
                "[user_orders] orders(user_id) uniqueness (1-side)",
                "[user_orders] users -> orders referential integrity",
            ]
        );
        assert_eq!(
            descriptions(Cardinality::ManyToMany),
            vec![
                "[user_orders] users -> orders referential integrity",
                "[user_orders] orders -> users referential integrity",
            ]
        );
    }

    #[tokio::test]
    async fn test_one_to_many_passes_with_null_keys() {
        let session = session(false);
        let validator = RelationValidator::new(&session);
        let results = validator
            .run(&[relation(Cardinality::OneToMany)], &TableVerdicts::default())
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == CheckStatus::Ok));
        assert!(results.iter().all(|r| r.result_count == Some(0)));
    }

    #[tokio::test]
    async fn test_orphan_and_duplicate_are_ng() {
        let session = session(true);
        let validator = RelationValidator::new(&session);
        let results = validator
            .run(&[relation(Cardinality::OneToOne)], &TableVerdicts::default())
            .await;
        let statuses: Vec<CheckStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                CheckStatus::Ok, // users unique
                CheckStatus::Ng, // orders.user_id has 1 twice
                CheckStatus::Ng, // user 2 has no order
                CheckStatus::Ng, // order references user 9
            ]
        );
        assert_eq!(results[3].result_count, Some(1));
    }

    #[tokio::test]
    async fn test_tainted_table_skips_relation() {
        let session = session(true);
        let mut verdicts = TableVerdicts::default();
        verdicts.insert(
            "orders",
            TableVerdict {
                load_failed: true,
                check_failed: false,
            },
        );
        let results = RelationValidator::new(&session)
            .run(&[relation(Cardinality::OneToMany)], &verdicts)
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.status == CheckStatus::Skipped));
        assert_eq!(
            results[0].message.as_deref(),
            Some("Skipped due to errors in: orders")
        );
    }

    #[tokio::test]
    async fn test_skip_policy_for_check_failures() {
        let session = session(false);
        let mut verdicts = TableVerdicts::default();
        verdicts.insert(
            "users",
            TableVerdict {
                load_failed: false,
                check_failed: true,
            },
        );
        let rels = [relation(Cardinality::OneToMany)];

        let strict = RelationValidator::new(&session).run(&rels, &verdicts).await;
        assert!(strict.iter().all(|r| r.status == CheckStatus::Skipped));
        assert_eq!(
            strict[0].message.as_deref(),
            Some("Skipped due to errors in: users (check failed)")
        );

        let lenient = RelationValidator::new(&session)
            .with_policy(RelationSkipPolicy::LoadFailureOnly)
            .run(&rels, &verdicts)
            .await;
        assert!(lenient.iter().all(|r| r.status == CheckStatus::Ok));
    }

    #[tokio::test]
    async fn test_missing_table_is_error() {
        let ctx = SessionContext::new();
        register(&ctx, "users", &[("user_id", vec![Some(1)])]);
        let session = ReadOnlySession::from_context(ctx);
        let results = RelationValidator::new(&session)
            .run(&[relation(Cardinality::ManyToMany)], &TableVerdicts::default())
            .await;
        assert!(results.iter().all(|r| r.status == CheckStatus::Error));
        assert!(results[0].message.as_deref().unwrap().contains("orders"));
    }

    #[test]
    fn test_verdicts_from_results() {
        use crate::sources::{LoadFailure, LoadFailureKind, LoadOutcome};
        let mut outcomes = LoadOutcomes::new();
        outcomes.insert("users", LoadOutcome::default());
        outcomes.insert(
            "orders",
            LoadOutcome {
                failures: vec![LoadFailure::new("f", LoadFailureKind::Unknown, "x")],
                ..Default::default()
            },
        );
        let results = vec![TableCheckResults {
            table: "users".to_string(),
            checks: vec![CheckResult::from_count("d", "q", 2, true)],
            aggregate_checks: vec![],
        }];
        let verdicts = TableVerdicts::from_results(&outcomes, &results);
        assert!(verdicts.get("users").check_failed);
        assert!(!verdicts.get("users").load_failed);
        assert!(verdicts.get("orders").load_failed);
        assert_eq!(verdicts.get("unknown"), TableVerdict::default());
    }
}
