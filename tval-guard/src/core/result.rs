//! Check results.

use super::session::{QueryErrorKind, QueryFailure};
use super::status::CheckStatus;
use serde::{Deserialize, Serialize};

/// Outcome of one executed or skipped check.
///
/// Results are built once through the constructors below and never modified
/// by later stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Human-readable description of what was checked
    pub description: String,
    /// Query text after table substitution
    pub query: String,
    pub status: CheckStatus,
    /// Value returned by the query, when it ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_count: Option<i64>,
    /// Explanation for anything but OK; raw engine text for ERROR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Classification of the engine failure for ERROR results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<QueryErrorKind>,
}

impl CheckResult {
    /// Classifies a count against the pass convention of the check.
    pub fn from_count(
        description: impl Into<String>,
        query: impl Into<String>,
        count: i64,
        expect_zero: bool,
    ) -> Self {
        let passed = if expect_zero { count == 0 } else { count > 0 };
        let (status, message) = if passed {
            (CheckStatus::Ok, None)
        } else {
            (CheckStatus::Ng, Some(format!("Result count: {count}")))
        };
        Self {
            description: description.into(),
            query: query.into(),
            status,
            result_count: Some(count),
            message,
            error_kind: None,
        }
    }

    /// Records a query that failed to execute.
    pub fn error(
        description: impl Into<String>,
        query: impl Into<String>,
        failure: QueryFailure,
    ) -> Self {
        Self {
            description: description.into(),
            query: query.into(),
            status: CheckStatus::Error,
            result_count: None,
            message: Some(failure.message),
            error_kind: Some(failure.kind),
        }
    }

    /// Records a check that was not run.
    pub fn skipped(
        description: impl Into<String>,
        query: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            query: query.into(),
            status: CheckStatus::Skipped,
            result_count: None,
            message: Some(message.into()),
            error_kind: None,
        }
    }
}
