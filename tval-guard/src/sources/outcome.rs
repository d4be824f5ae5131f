//! Load failures and per-table load outcomes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Category of a file-level load failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadFailureKind {
    TypeMismatch,
    NotNull,
    ColumnMismatch,
    UniqueViolation,
    FkViolation,
    Encoding,
    NoFiles,
    UnsupportedFormat,
    Io,
    Unknown,
}

/// One failed file, or one key violation found after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub file_path: String,
    pub kind: LoadFailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<u64>,
    /// Original diagnostic text, kept even when `kind` is known
    pub raw_message: String,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| {
            #[allow(clippy::expect_used)]
            Regex::new($re).expect("Hard-coded regex pattern should be valid")
        });
    };
}

pattern!(
    CSV_PARSE,
    r"(?s)parsing value '.*?' as type '?\w+'? for column (\d+) at line (\d+)"
);
pattern!(
    CAST_FAILURE,
    r"(?i)(cannot cast string|cast error|error parsing timestamp|invalid date|could not convert|failed to parse)"
);
pattern!(
    NOT_NULL,
    r"column at '(\d+)' has null but schema specifies non-nullable"
);
pattern!(
    FIELD_COUNT,
    r"incorrect number of fields for line (\d+), expected \d+ got \d+"
);
pattern!(
    SCHEMA_SHAPE,
    r"(?i)(no field named|same schema|number of columns|column count)"
);
pattern!(IO_FAILURE, r"(?i)^(io error|external error: .*no such file)");

impl LoadFailure {
    pub fn new(
        file_path: impl Into<String>,
        kind: LoadFailureKind,
        raw_message: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            kind,
            column: None,
            row: None,
            raw_message: raw_message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_row(mut self, row: u64) -> Self {
        self.row = Some(row);
        self
    }

    /// Classifies an engine message raised while loading `file_path`.
    ///
    /// `columns` maps positional column indexes in the message back to
    /// names. Unrecognised messages are `Unknown`; the text is kept as is.
    pub fn classify(
        file_path: impl Into<String>,
        raw_message: impl Into<String>,
        columns: &[String],
    ) -> Self {
        let raw_message = raw_message.into();
        let column_at = |index: &str| -> Option<String> {
            index.parse::<usize>().ok().and_then(|i| columns.get(i).cloned())
        };

        let (kind, column, row) = if let Some(caps) = CSV_PARSE.captures(&raw_message) {
            (
                LoadFailureKind::TypeMismatch,
                column_at(&caps[1]),
                caps[2].parse().ok(),
            )
        } else if let Some(caps) = NOT_NULL.captures(&raw_message) {
            (LoadFailureKind::NotNull, column_at(&caps[1]), None)
        } else if let Some(caps) = FIELD_COUNT.captures(&raw_message) {
            (LoadFailureKind::ColumnMismatch, None, caps[1].parse().ok())
        } else if CAST_FAILURE.is_match(&raw_message) {
            (LoadFailureKind::TypeMismatch, None, None)
        } else if SCHEMA_SHAPE.is_match(&raw_message) {
            (LoadFailureKind::ColumnMismatch, None, None)
        } else if IO_FAILURE.is_match(&raw_message) {
            (LoadFailureKind::Io, None, None)
        } else {
            (LoadFailureKind::Unknown, None, None)
        };

        Self {
            file_path: file_path.into(),
            kind,
            column,
            row,
            raw_message,
        }
    }
}

/// Everything known about loading one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Files inserted without error
    pub files_loaded: Vec<String>,
    /// Rows inserted across all loaded files
    pub rows_loaded: u64,
    pub failures: Vec<LoadFailure>,
}

impl LoadOutcome {
    /// A table with any load failure is tainted; its checks are skipped.
    pub fn is_tainted(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Load outcomes by table name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadOutcomes(BTreeMap<String, LoadOutcome>);

impl LoadOutcomes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, outcome: LoadOutcome) {
        self.0.insert(table.into(), outcome);
    }

    pub fn get(&self, table: &str) -> Option<&LoadOutcome> {
        self.0.get(table)
    }

    /// Failures for `table`; empty when the table is unknown.
    pub fn failures(&self, table: &str) -> &[LoadFailure] {
        self.0.get(table).map(|o| o.failures.as_slice()).unwrap_or(&[])
    }

    pub fn is_tainted(&self, table: &str) -> bool {
        !self.failures(table).is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &LoadOutcome)> {
        self.0.iter()
    }
}

impl FromIterator<(String, LoadOutcome)> for LoadOutcomes {
    fn from_iter<I: IntoIterator<Item = (String, LoadOutcome)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["id".to_string(), "amount".to_string()]
    }

    #[test]
    fn test_classify_csv_parse_error() {
        let msg = "Arrow error: Parser error: Error while parsing value 'abc' as type 'Int64' for column 1 at line 4. Row data: '[1,abc]'";
        let failure = LoadFailure::classify("data/a.csv", msg, &columns());
        assert_eq!(failure.kind, LoadFailureKind::TypeMismatch);
        assert_eq!(failure.column.as_deref(), Some("amount"));
        assert_eq!(failure.row, Some(4));
        assert_eq!(failure.raw_message, msg);
    }

    #[test]
    fn test_classify_cast_error() {
        let msg = "Arrow error: Cast error: Cannot cast string 'x' to value of Int64 type";
        let failure = LoadFailure::classify("a.csv", msg, &columns());
        assert_eq!(failure.kind, LoadFailureKind::TypeMismatch);
        assert!(failure.column.is_none());
    }

    #[test]
    fn test_classify_not_null() {
        let msg = "Execution error: Invalid batch column at '0' has null but schema specifies non-nullable";
        let failure = LoadFailure::classify("a.csv", msg, &columns());
        assert_eq!(failure.kind, LoadFailureKind::NotNull);
        assert_eq!(failure.column.as_deref(), Some("id"));
    }

    #[test]
    fn test_classify_field_count() {
        let msg = "Arrow error: Csv error: incorrect number of fields for line 3, expected 2 got 3";
        let failure = LoadFailure::classify("a.csv", msg, &columns());
        assert_eq!(failure.kind, LoadFailureKind::ColumnMismatch);
        assert_eq!(failure.row, Some(3));
    }

    #[test]
    fn test_unrecognised_message_keeps_text() {
        let failure = LoadFailure::classify("a.csv", "something odd happened", &columns());
        assert_eq!(failure.kind, LoadFailureKind::Unknown);
        assert_eq!(failure.raw_message, "something odd happened");
    }

    #[test]
    fn test_outcomes_taint() {
        let mut outcomes = LoadOutcomes::new();
        outcomes.insert("users", LoadOutcome::default());
        outcomes.insert(
            "orders",
            LoadOutcome {
                failures: vec![LoadFailure::new("d", LoadFailureKind::NoFiles, "no files")],
                ..Default::default()
            },
        );
        assert!(!outcomes.is_tainted("users"));
        assert!(outcomes.is_tainted("orders"));
        assert!(!outcomes.is_tainted("unknown"));
        assert!(outcomes.failures("unknown").is_empty());
    }

    #[test]
    fn test_failure_kind_serialization() {
        assert_eq!(
            serde_json::to_string(&LoadFailureKind::FkViolation).unwrap(),
            "\"FK_VIOLATION\""
        );
    }
}
