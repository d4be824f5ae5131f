//! Per-column descriptive statistics for tables that passed their checks.

use crate::core::{QueryFailure, ReadOnlySession};
use crate::schema::{ColumnDefinition, TableDefinition};
use crate::security::quote_identifier;
use arrow::array::{Array, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

/// Statistics of a single column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column: String,
    pub logical_name: String,
    pub data_type: String,
    pub is_numeric: bool,
    pub count: i64,
    pub not_null_count: i64,
    pub distinct_count: i64,
    pub mean: Option<f64>,
    /// Sample standard deviation
    pub stddev: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
    /// Raw engine text when a profiling query failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ColumnProfile {
    fn empty(column: &ColumnDefinition) -> Self {
        Self {
            column: column.name.clone(),
            logical_name: column.logical_name.clone(),
            data_type: column.data_type.clone(),
            is_numeric: column.is_numeric(),
            ..Default::default()
        }
    }

    pub fn null_count(&self) -> i64 {
        self.count - self.not_null_count
    }
}

fn int_at(batch: &RecordBatch, index: usize) -> Result<i64, QueryFailure> {
    let column = cast(batch.column(index), &DataType::Int64)?;
    let values = column.as_primitive::<Int64Type>();
    Ok(if values.is_empty() || values.is_null(0) {
        0
    } else {
        values.value(0)
    })
}

fn float_at(batch: &RecordBatch, index: usize) -> Result<Option<f64>, QueryFailure> {
    let column = cast(batch.column(index), &DataType::Float64)?;
    let values = column.as_primitive::<Float64Type>();
    Ok((!values.is_empty() && !values.is_null(0)).then(|| values.value(0)))
}

async fn single_row(
    session: &ReadOnlySession,
    sql: &str,
) -> Result<Option<RecordBatch>, QueryFailure> {
    let batches = session.query(sql, &[]).await?;
    Ok(batches.into_iter().find(|b| b.num_rows() > 0))
}

/// Computes a profile for every column of `def`.
///
/// An empty table yields no profiles. A failing query is recorded on the
/// affected column and profiling moves on.
#[instrument(skip_all, fields(table = %def.name))]
pub async fn profile_table(session: &ReadOnlySession, def: &TableDefinition) -> Vec<ColumnProfile> {
    info!(table = %def.name, "Profiling started");
    let table = quote_identifier(&def.name);

    let rows = match session
        .count(&format!("SELECT COUNT(*) FROM {table}"), &[])
        .await
    {
        Ok(rows) => rows,
        Err(failure) => {
            error!(table = %def.name, error = %failure, "Profiling failed");
            return Vec::new();
        }
    };
    if rows == 0 {
        info!(table = %def.name, "Profiling completed");
        return Vec::new();
    }

    let mut profiles = Vec::with_capacity(def.columns.len());
    for column in &def.columns {
        let mut profile = ColumnProfile::empty(column);
        if let Err(failure) = fill_profile(session, &table, column, &mut profile).await {
            error!(
                table = %def.name,
                column = %column.name,
                error = %failure,
                "Profiling failed"
            );
            profile.error = Some(failure.message);
        }
        profiles.push(profile);
    }

    info!(table = %def.name, columns = profiles.len(), "Profiling completed");
    profiles
}

async fn fill_profile(
    session: &ReadOnlySession,
    table: &str,
    column: &ColumnDefinition,
    profile: &mut ColumnProfile,
) -> Result<(), QueryFailure> {
    let col = quote_identifier(&column.name);

    let sql = format!(
        "SELECT COUNT(*), COUNT({col}), COUNT(DISTINCT {col}) FROM {table}"
    );
    if let Some(batch) = single_row(session, &sql).await? {
        profile.count = int_at(&batch, 0)?;
        profile.not_null_count = int_at(&batch, 1)?;
        profile.distinct_count = int_at(&batch, 2)?;
    }

    if !column.is_numeric() {
        return Ok(());
    }

    let value = format!("CAST({col} AS DOUBLE)");
    let sql = format!(
        "SELECT AVG({value}), STDDEV({value}), MIN({value}), MAX({value}) FROM {table}"
    );
    if let Some(batch) = single_row(session, &sql).await? {
        profile.mean = float_at(&batch, 0)?;
        profile.stddev = float_at(&batch, 1)?;
        profile.min = float_at(&batch, 2)?;
        profile.max = float_at(&batch, 3)?;
    }

    if profile.not_null_count == 0 {
        return Ok(());
    }
    let percentile =
        |p: f64| format!("approx_percentile_cont({p}) WITHIN GROUP (ORDER BY {value})");
    let sql = format!(
        "SELECT {}, {}, {} FROM {table} WHERE {col} IS NOT NULL",
        percentile(0.25),
        percentile(0.5),
        percentile(0.75)
    );
    if let Some(batch) = single_row(session, &sql).await? {
        profile.p25 = float_at(&batch, 0)?;
        profile.median = float_at(&batch, 1)?;
        profile.p75 = float_at(&batch, 2)?;
    }
    Ok(())
}
