//! Error types for the tval-guard validation engine.
//!
//! Only startup and definition problems surface as [`TvalError`]. Data
//! problems found while validating a batch are recorded as check results
//! and load failures instead, so a single run reports as much as it can.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for tval-guard.
#[derive(Error, Debug)]
pub enum TvalError {
    /// The foreign-key graph contains a cycle, so no load order exists.
    #[error("Cyclic dependency detected between tables: {}", tables.join(", "))]
    CyclicDependency {
        /// Tables that participate in the cycle, sorted by name
        tables: Vec<String>,
    },

    /// A foreign key names a table that is not defined.
    #[error("Table '{table}' references undefined table '{target}'")]
    UnknownReference {
        /// Table declaring the foreign key
        table: String,
        /// Missing target table
        target: String,
    },

    /// A relationship definition does not match the schema.
    #[error("Relation '{relation}' is invalid: {message}")]
    InvalidRelation { relation: String, message: String },

    /// A table definition failed cross-validation.
    #[error("Table definition '{table}' is invalid: {message}")]
    InvalidDefinition { table: String, message: String },

    /// An identifier or expression failed the SQL safety screen.
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Error related to configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A YAML document could not be parsed.
    #[error("Failed to parse YAML file '{}': {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from DataFusion operations outside check execution.
    #[error("DataFusion error: {0}")]
    DataFusion(#[from] datafusion::error::DataFusionError),

    /// Error from Arrow operations.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error from JSON serialization.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error for unexpected conditions.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A type alias for `Result<T, TvalError>`.
pub type Result<T> = std::result::Result<T, TvalError>;

impl TvalError {
    /// Creates a new invalid table definition error.
    pub fn invalid_definition(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid relation error.
    pub fn invalid_relation(relation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRelation {
            relation: relation.into(),
            message: message.into(),
        }
    }

    /// Returns true for errors raised while checking definitions, before any
    /// data is touched.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            TvalError::CyclicDependency { .. }
                | TvalError::UnknownReference { .. }
                | TvalError::InvalidRelation { .. }
                | TvalError::InvalidDefinition { .. }
                | TvalError::SecurityError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cyclic_dependency_lists_tables() {
        let err = TvalError::CyclicDependency {
            tables: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic dependency detected between tables: a, b"
        );
        assert!(err.is_definition_error());
    }

    #[test]
    fn test_unknown_reference_message() {
        let err = TvalError::UnknownReference {
            table: "orders".to_string(),
            target: "users".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Table 'orders' references undefined table 'users'"
        );
    }

    #[test]
    fn test_io_error_is_not_definition_error() {
        let err: TvalError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(!err.is_definition_error());
        assert!(err.to_string().starts_with("IO error"));
    }
}
