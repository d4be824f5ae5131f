//! Table, column, constraint and check definitions.

use datafusion::scalar::ScalarValue;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder replaced by the quoted table name in check queries.
pub const TABLE_PLACEHOLDER: &str = "{table}";

const NUMERIC_TYPES: &[&str] = &[
    "TINYINT",
    "SMALLINT",
    "INT",
    "INTEGER",
    "BIGINT",
    "TINYINT UNSIGNED",
    "SMALLINT UNSIGNED",
    "INT UNSIGNED",
    "INTEGER UNSIGNED",
    "BIGINT UNSIGNED",
    "FLOAT",
    "REAL",
    "DOUBLE",
    "DOUBLE PRECISION",
    "DECIMAL",
    "NUMERIC",
];

const TEMPORAL_TYPES: &[&str] = &["DATE", "TIMESTAMP", "TIME"];

/// A validated table definition. Immutable once the schema is loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Directory holding this table's data files
    pub source_dir: PathBuf,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub constraints: ConstraintSet,
    #[serde(default)]
    pub checks: Vec<CheckDefinition>,
    #[serde(default)]
    pub aggregate_checks: Vec<CheckDefinition>,
    #[serde(default)]
    pub row_conditions: Vec<RowCondition>,
    /// Columns used for hive partitioning on export
    #[serde(default)]
    pub partition_by: Vec<String>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            source_dir: PathBuf::new(),
            columns,
            constraints: ConstraintSet::default(),
            checks: Vec::new(),
            aggregate_checks: Vec::new(),
            row_conditions: Vec::new(),
            partition_by: Vec::new(),
        }
    }

    pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = dir.into();
        self
    }

    pub fn with_primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.constraints
            .unique
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_foreign_key(mut self, foreign_key: ForeignKey) -> Self {
        self.constraints.foreign_keys.push(foreign_key);
        self
    }

    pub fn with_check(mut self, check: CheckDefinition) -> Self {
        self.checks.push(check);
        self
    }

    pub fn with_aggregate_check(mut self, check: CheckDefinition) -> Self {
        self.aggregate_checks.push(check);
        self
    }

    pub fn with_row_condition(
        mut self,
        description: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.row_conditions.push(RowCondition {
            description: description.into(),
            condition: condition.into(),
        });
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Tables this one references through foreign keys, in declaration order.
    pub fn referenced_tables(&self) -> impl Iterator<Item = &str> {
        self.constraints
            .foreign_keys
            .iter()
            .map(|fk| fk.references.table.as_str())
    }
}

/// A single column with its type and value constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    /// Display name used in check descriptions; defaults to `name`
    pub logical_name: String,
    /// Upper-cased SQL type, e.g. `BIGINT` or `DECIMAL(10,2)`
    pub data_type: String,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// chrono parse pattern for text-encoded dates and timestamps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            logical_name: name.clone(),
            name,
            data_type: data_type.into().trim().to_uppercase(),
            not_null: false,
            description: String::new(),
            allowed_values: Vec::new(),
            min: None,
            max: None,
            format: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_logical_name(mut self, logical_name: impl Into<String>) -> Self {
        self.logical_name = logical_name.into();
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Type name without precision arguments: `DECIMAL(10,2)` becomes `DECIMAL`.
    pub fn base_type(&self) -> &str {
        self.data_type
            .split('(')
            .next()
            .unwrap_or(&self.data_type)
            .trim()
    }

    pub fn is_numeric(&self) -> bool {
        NUMERIC_TYPES.contains(&self.base_type())
    }

    pub fn is_temporal(&self) -> bool {
        TEMPORAL_TYPES.contains(&self.base_type())
    }

    pub fn has_range(&self) -> bool {
        self.min.is_some() || self.max.is_some()
    }
}

/// Primary key, unique groups and foreign keys of a table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintSet {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<ForeignKey>,
}

/// Local columns referencing columns of another table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub references: ForeignKeyTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub columns: Vec<String>,
}

impl ForeignKey {
    pub fn new<I, J, S, T>(columns: I, table: impl Into<String>, target_columns: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            references: ForeignKeyTarget {
                table: table.into(),
                columns: target_columns.into_iter().map(Into::into).collect(),
            },
        }
    }
}

/// A user-declared check query.
///
/// `query` may contain `{table}`, which is replaced by the quoted table name,
/// and `$1, $2, …` placeholders bound from `params`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub description: String,
    pub query: String,
    /// When true, a zero result passes; when false, a positive result passes
    #[serde(default = "default_expect_zero")]
    pub expect_zero: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<CheckParam>,
}

fn default_expect_zero() -> bool {
    true
}

impl CheckDefinition {
    pub fn new(description: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            query: query.into(),
            expect_zero: true,
            params: Vec::new(),
        }
    }

    pub fn expect_nonzero(mut self) -> Self {
        self.expect_zero = false;
        self
    }

    pub fn with_params(mut self, params: Vec<CheckParam>) -> Self {
        self.params = params;
        self
    }

    /// Query text with the table placeholder resolved.
    pub fn resolve_query(&self, quoted_table: &str) -> String {
        self.query.replace(TABLE_PLACEHOLDER, quoted_table)
    }

    pub fn scalar_params(&self) -> Vec<ScalarValue> {
        self.params.iter().map(CheckParam::to_scalar).collect()
    }
}

/// A typed value bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckParam {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl CheckParam {
    pub fn to_scalar(&self) -> ScalarValue {
        match self {
            CheckParam::Bool(v) => ScalarValue::Boolean(Some(*v)),
            CheckParam::Int(v) => ScalarValue::Int64(Some(*v)),
            CheckParam::Float(v) => ScalarValue::Float64(Some(*v)),
            CheckParam::Text(v) => ScalarValue::Utf8(Some(v.clone())),
        }
    }
}

/// A boolean expression every row must satisfy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCondition {
    pub description: String,
    pub condition: String,
}
