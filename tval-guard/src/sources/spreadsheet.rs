//! `.xlsx` ingestion.
//!
//! The first worksheet is read into an all-text batch: the header row is
//! dropped and cells map positionally onto the table's columns, as CSV
//! columns do. Typing happens later in the same INSERT casts.

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use calamine::{open_workbook, Data, Reader, Xlsx, XlsxError};
use chrono::Timelike;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Failed to read workbook: {0}")]
    Workbook(#[from] XlsxError),
    #[error("Workbook has no worksheet")]
    NoWorksheet,
    #[error("Worksheet has no header row")]
    NoHeader,
    #[error("Worksheet has {found} columns but the table defines {expected}")]
    ColumnCount { found: usize, expected: usize },
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// Reads the first worksheet of `path` as text columns named `columns`.
pub fn read_first_sheet(path: &Path, columns: &[String]) -> Result<RecordBatch, SheetError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(SheetError::NoWorksheet)??;

    let mut rows = range.rows();
    let header = rows.next().ok_or(SheetError::NoHeader)?;
    if header.len() != columns.len() {
        return Err(SheetError::ColumnCount {
            found: header.len(),
            expected: columns.len(),
        });
    }

    let mut values: Vec<Vec<Option<String>>> = vec![Vec::new(); columns.len()];
    for row in rows {
        for (column, cell) in values.iter_mut().zip(row) {
            column.push(cell_text(cell));
        }
    }

    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|name| Field::new(name, DataType::Utf8, true))
            .collect::<Vec<_>>(),
    ));
    let arrays: Vec<ArrayRef> = values
        .into_iter()
        .map(|column| Arc::new(StringArray::from(column)) as ArrayRef)
        .collect();
    Ok(RecordBatch::try_new(schema, arrays)?)
}

/// Text form of a cell, or `None` for an empty one.
///
/// Whole numbers print without a fractional part (`3`, not `3.0`). Dates
/// print as `%Y-%m-%d`, with a time part only when it is not midnight.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::DateTime(value) => value.as_datetime().map(|ts| {
            if ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 {
                ts.format("%Y-%m-%d").to_string()
            } else {
                ts.format("%Y-%m-%d %H:%M:%S").to_string()
            }
        }),
        other => Some(other.to_string()),
    }
}
