//! Key verification after a table is loaded.
//!
//! DataFusion records PRIMARY KEY and UNIQUE as informational constraints
//! and has no foreign keys at all, so they are verified here with counting
//! queries. Violations become load failures and taint the table.

use super::outcome::{LoadFailure, LoadFailureKind};
use crate::checks::compile::{null_count_sql, referential_sql, uniqueness_sql};
use crate::core::LoadSession;
use crate::schema::TableDefinition;
use tracing::error;

/// Runs every key check for `def` and returns the violations found.
pub async fn verify_keys(session: &LoadSession, def: &TableDefinition) -> Vec<LoadFailure> {
    let location = def.source_dir.display().to_string();
    let mut failures = Vec::new();
    let pk = &def.constraints.primary_key;

    if !pk.is_empty() {
        let cols = pk.join(", ");
        record(
            session,
            &mut failures,
            &location,
            &null_count_sql(&def.name, pk),
            LoadFailureKind::NotNull,
            |n| format!("{n} row(s) have NULL in primary key ({cols})"),
        )
        .await;
        record(
            session,
            &mut failures,
            &location,
            &uniqueness_sql(&def.name, pk, false),
            LoadFailureKind::UniqueViolation,
            |n| format!("Duplicate key violates primary key constraint ({cols}): {n} duplicated key(s)"),
        )
        .await;
    }

    for group in &def.constraints.unique {
        let cols = group.join(", ");
        record(
            session,
            &mut failures,
            &location,
            &uniqueness_sql(&def.name, group, true),
            LoadFailureKind::UniqueViolation,
            |n| format!("Duplicate key violates unique constraint ({cols}): {n} duplicated key(s)"),
        )
        .await;
    }

    for fk in &def.constraints.foreign_keys {
        let cols = fk.columns.join(", ");
        let target = &fk.references.table;
        let target_cols = fk.references.columns.join(", ");
        record(
            session,
            &mut failures,
            &location,
            &referential_sql(&def.name, &fk.columns, target, &fk.references.columns),
            LoadFailureKind::FkViolation,
            |n| {
                format!(
                    "Violates foreign key constraint ({cols}) -> {target}({target_cols}): {n} row(s) reference missing keys"
                )
            },
        )
        .await;
    }

    for failure in &failures {
        error!(
            table = %def.name,
            kind = ?failure.kind,
            error = %failure.raw_message,
            "Key verification failed"
        );
    }
    failures
}

async fn record(
    session: &LoadSession,
    failures: &mut Vec<LoadFailure>,
    location: &str,
    sql: &str,
    kind: LoadFailureKind,
    describe: impl FnOnce(i64) -> String,
) {
    match session.count(sql).await {
        Ok(0) => {}
        Ok(n) => failures.push(LoadFailure::new(location, kind, describe(n))),
        Err(e) => failures.push(LoadFailure::new(location, LoadFailureKind::Unknown, e.message)),
    }
}
