//! Query sessions over the embedded DataFusion engine.
//!
//! A run owns exactly one [`LoadSession`] while tables are created and
//! filled. [`LoadSession::into_read_only`] consumes it and hands back a
//! [`ReadOnlySession`], which plans every statement with DDL, DML and
//! statement execution disabled. Check text written by users therefore
//! cannot change the data it validates.

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Int64Type};
use datafusion::common::TableReference;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::error::DataFusionError;
use datafusion::execution::context::SQLOptions;
use datafusion::prelude::*;
use datafusion::scalar::ScalarValue;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Best-effort classification of a failed query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    /// The SQL text could not be parsed
    Syntax,
    /// Planning failed (unknown table or column, type coercion)
    Planning,
    /// The statement tried to modify data or schema on a read-only handle
    ReadOnlyViolation,
    /// The plan failed while running (casts, arithmetic)
    Execution,
    /// The engine does not implement the requested feature
    Unsupported,
    /// The query ran but its result could not be read as a count
    ResultShape,
    Other,
}

/// A failed query. `message` is the engine's text, unmodified.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{message}")]
pub struct QueryFailure {
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryFailure {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

const READ_ONLY_MARKERS: [&str; 3] = [
    "DDL not supported",
    "DML not supported",
    "Statement not supported",
];

impl From<DataFusionError> for QueryFailure {
    fn from(err: DataFusionError) -> Self {
        let message = err.to_string();
        let kind = if READ_ONLY_MARKERS.iter().any(|m| message.contains(m)) {
            QueryErrorKind::ReadOnlyViolation
        } else {
            match err.find_root() {
                DataFusionError::SQL(..) => QueryErrorKind::Syntax,
                DataFusionError::Plan(_) | DataFusionError::SchemaError(..) => {
                    QueryErrorKind::Planning
                }
                DataFusionError::NotImplemented(_) => QueryErrorKind::Unsupported,
                DataFusionError::Execution(_) | DataFusionError::ArrowError(..) => {
                    QueryErrorKind::Execution
                }
                _ => QueryErrorKind::Other,
            }
        };
        Self { kind, message }
    }
}

impl From<arrow::error::ArrowError> for QueryFailure {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::new(QueryErrorKind::Execution, err.to_string())
    }
}

/// Read-write handle used only during the load phase.
pub struct LoadSession {
    ctx: SessionContext,
}

impl Default for LoadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadSession {
    /// Column names keep their declared case. Unquoted identifiers in user
    /// checks and row conditions are matched exactly as written.
    pub fn new() -> Self {
        let mut config = SessionConfig::new();
        config.options_mut().sql_parser.enable_ident_normalization = false;
        Self {
            ctx: SessionContext::new_with_config(config),
        }
    }

    /// Executes a statement (DDL or DML) and waits for it to finish.
    pub async fn execute(&self, sql: &str) -> Result<(), QueryFailure> {
        self.ctx.sql(sql).await?.collect().await?;
        Ok(())
    }

    /// Runs a counting query on the read-write handle.
    pub async fn count(&self, sql: &str) -> Result<i64, QueryFailure> {
        let batches = self.ctx.sql(sql).await?.collect().await?;
        first_value_as_i64(&batches)
    }

    /// The underlying context, for file ingestion.
    pub(crate) fn context(&self) -> &SessionContext {
        &self.ctx
    }

    /// Ends the load phase. No read-write handle survives this call.
    pub fn into_read_only(self) -> ReadOnlySession {
        ReadOnlySession { ctx: self.ctx }
    }
}

/// Read-only handle used for checks, relation checks, profiling and export.
#[derive(Clone)]
pub struct ReadOnlySession {
    ctx: SessionContext,
}

impl ReadOnlySession {
    /// Wraps an existing context. Intended for tests that register
    /// in-memory tables directly.
    pub fn from_context(ctx: SessionContext) -> Self {
        Self { ctx }
    }

    fn options() -> SQLOptions {
        SQLOptions::new()
            .with_allow_ddl(false)
            .with_allow_dml(false)
            .with_allow_statements(false)
    }

    /// Plans and runs a query with `$n` placeholders bound to `params`.
    pub async fn query(
        &self,
        sql: &str,
        params: &[ScalarValue],
    ) -> Result<Vec<RecordBatch>, QueryFailure> {
        let mut df = self.ctx.sql_with_options(sql, Self::options()).await?;
        if !params.is_empty() {
            df = df.with_param_values(params.to_vec())?;
        }
        Ok(df.collect().await?)
    }

    /// Runs a query and reads the first column of the first row as a count.
    ///
    /// An empty result counts as zero. A NULL value is a failure.
    pub async fn count(&self, sql: &str, params: &[ScalarValue]) -> Result<i64, QueryFailure> {
        let batches = self.query(sql, params).await?;
        first_value_as_i64(&batches)
    }

    /// Writes a table to Parquet under `dir`, optionally hive-partitioned.
    pub async fn export_parquet(
        &self,
        table: &str,
        dir: &Path,
        partition_by: &[String],
    ) -> Result<(), QueryFailure> {
        let df = self.ctx.table(TableReference::bare(table)).await?;
        let (path, options) = if partition_by.is_empty() {
            (
                dir.join(format!("{table}.parquet")),
                DataFrameWriteOptions::new().with_single_file_output(true),
            )
        } else {
            (
                dir.to_path_buf(),
                DataFrameWriteOptions::new().with_partition_by(partition_by.to_vec()),
            )
        };
        df.write_parquet(&path.to_string_lossy(), options, None)
            .await?;
        Ok(())
    }
}

pub(crate) fn first_value_as_i64(batches: &[RecordBatch]) -> Result<i64, QueryFailure> {
    let Some(batch) = batches.iter().find(|b| b.num_rows() > 0) else {
        return Ok(0);
    };
    if batch.num_columns() == 0 {
        return Err(QueryFailure::new(
            QueryErrorKind::ResultShape,
            "query returned no columns",
        ));
    }
    let column = cast(batch.column(0), &DataType::Int64).map_err(|e| {
        QueryFailure::new(
            QueryErrorKind::ResultShape,
            format!("first column is not numeric: {e}"),
        )
    })?;
    let values = column.as_primitive::<Int64Type>();
    if values.is_null(0) {
        return Err(QueryFailure::new(
            QueryErrorKind::ResultShape,
            "query returned NULL instead of a count",
        ));
    }
    Ok(values.value(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{Field, Schema};
    use datafusion::datasource::MemTable;
    use std::sync::Arc;

    fn users_context() -> SessionContext {
        let schema = Arc::new(Schema::new(vec![
            Field::new("user_id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec![Some("a"), None, Some("c")])),
            ],
        )
        .unwrap();
        let ctx = SessionContext::new();
        let table = MemTable::try_new(schema, vec![vec![batch]]).unwrap();
        ctx.register_table("users", Arc::new(table)).unwrap();
        ctx
    }

    #[tokio::test]
    async fn test_count_with_params() {
        let session = ReadOnlySession::from_context(users_context());
        let count = session
            .count(
                "SELECT COUNT(*) FROM users WHERE user_id > CAST($1 AS BIGINT)",
                &[ScalarValue::Int64(Some(1))],
            )
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_empty_result_counts_as_zero() {
        let session = ReadOnlySession::from_context(users_context());
        let count = session
            .count("SELECT user_id FROM users WHERE user_id > 10", &[])
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_null_count_is_result_shape_failure() {
        let session = ReadOnlySession::from_context(users_context());
        let err = session
            .count("SELECT MAX(user_id) FROM users WHERE user_id > 10", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ResultShape);
    }

    #[tokio::test]
    async fn test_read_only_rejects_mutation() {
        let session = ReadOnlySession::from_context(users_context());

        let err = session
            .count("INSERT INTO users VALUES (4, 'd')", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ReadOnlyViolation);

        let err = session.count("DROP TABLE users", &[]).await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::ReadOnlyViolation);

        let count = session.count("SELECT COUNT(*) FROM users", &[]).await.unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_engine_text() {
        let session = ReadOnlySession::from_context(users_context());
        let err = session
            .count("SELECT COUNT(*) FROM missing_table", &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Planning);
        assert!(err.message.contains("missing_table"));

        let err = session.count("SELEC nonsense", &[]).await.unwrap_err();
        assert_eq!(err.kind, QueryErrorKind::Syntax);
        assert!(!err.message.is_empty());
    }

    #[tokio::test]
    async fn test_load_session_executes_ddl_then_hands_off() {
        let load = LoadSession::new();
        load.execute("CREATE TABLE t (id BIGINT NOT NULL)").await.unwrap();
        load.execute("INSERT INTO t VALUES (1), (2)").await.unwrap();
        assert_eq!(load.count("SELECT COUNT(*) FROM t").await.unwrap(), 2);

        let read_only = load.into_read_only();
        assert_eq!(read_only.count("SELECT COUNT(*) FROM t", &[]).await.unwrap(), 2);
        assert!(read_only.count("DELETE FROM t", &[]).await.is_err());
        assert_eq!(read_only.count("SELECT COUNT(*) FROM t", &[]).await.unwrap(), 2);
    }
}
