//! Reads table and relation definitions from YAML and cross-validates them.

use super::relation::{RelationDefinition, RelationsFile};
use super::table::{
    CheckDefinition, ColumnDefinition, ConstraintSet, ForeignKey, RowCondition, TableDefinition,
};
use crate::error::{Result, TvalError};
use crate::security::SqlSecurity;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct TableFile {
    table: TableMeta,
    columns: Vec<ColumnSpec>,
    #[serde(default)]
    table_constraints: ConstraintsSpec,
    #[serde(default)]
    export: ExportSpec,
}

#[derive(Debug, Deserialize)]
struct TableMeta {
    name: String,
    #[serde(default)]
    description: String,
    source_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
struct ColumnSpec {
    name: String,
    logical_name: Option<String>,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    not_null: bool,
    #[serde(default)]
    description: String,
    #[serde(default)]
    allowed_values: Vec<serde_yaml::Value>,
    min: Option<f64>,
    max: Option<f64>,
    format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ConstraintsSpec {
    #[serde(default)]
    primary_key: OneOrMany<KeySpec>,
    #[serde(default)]
    unique: Vec<KeySpec>,
    #[serde(default)]
    foreign_keys: Vec<ForeignKey>,
    #[serde(default)]
    checks: Vec<CheckDefinition>,
    #[serde(default)]
    aggregation_checks: Vec<CheckDefinition>,
    #[serde(default)]
    row_conditions: Vec<RowCondition>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportSpec {
    #[serde(default)]
    partition_by: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct KeySpec {
    columns: Vec<String>,
}

/// `primary_key` may be written as a single mapping or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

fn read_yaml<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text).map_err(|source| TvalError::Yaml {
        path: path.to_path_buf(),
        source,
    })
}

fn yaml_scalar_to_string(table: &str, column: &str, value: serde_yaml::Value) -> Result<String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(TvalError::invalid_definition(
            table,
            format!("allowed_values of column '{column}' must be scalars, got {other:?}"),
        )),
    }
}

impl TableFile {
    fn into_definition(self, project_root: &Path) -> Result<TableDefinition> {
        let name = self.table.name;

        let columns = self
            .columns
            .into_iter()
            .map(|spec| {
                let allowed_values = spec
                    .allowed_values
                    .into_iter()
                    .map(|v| yaml_scalar_to_string(&name, &spec.name, v))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ColumnDefinition {
                    logical_name: spec.logical_name.unwrap_or_else(|| spec.name.clone()),
                    name: spec.name,
                    data_type: spec.data_type.trim().to_uppercase(),
                    not_null: spec.not_null,
                    description: spec.description,
                    allowed_values,
                    min: spec.min,
                    max: spec.max,
                    format: spec.format,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut primary_keys = self.table_constraints.primary_key.into_vec();
        if primary_keys.len() > 1 {
            return Err(TvalError::invalid_definition(
                &name,
                "only one primary_key may be declared",
            ));
        }
        let primary_key = primary_keys.pop().map(|k| k.columns).unwrap_or_default();

        let source_dir = if self.table.source_dir.is_absolute() {
            self.table.source_dir
        } else {
            project_root.join(self.table.source_dir)
        };

        Ok(TableDefinition {
            name,
            description: self.table.description,
            source_dir,
            columns,
            constraints: ConstraintSet {
                primary_key,
                unique: self
                    .table_constraints
                    .unique
                    .into_iter()
                    .map(|k| k.columns)
                    .collect(),
                foreign_keys: self.table_constraints.foreign_keys,
            },
            checks: self.table_constraints.checks,
            aggregate_checks: self.table_constraints.aggregation_checks,
            row_conditions: self.table_constraints.row_conditions,
            partition_by: self.export.partition_by,
        })
    }
}

/// Loads one table definition file and validates it.
///
/// `source_dir` is resolved against `project_root` and must exist inside it.
pub fn load_table_definition(path: &Path, project_root: &Path) -> Result<TableDefinition> {
    let file: TableFile = read_yaml(path)?;
    let definition = file.into_definition(project_root)?;
    validate_table(&definition)?;
    validate_source_dir(&definition, project_root)?;
    debug!(table = %definition.name, path = %path.display(), "Loaded table definition");
    Ok(definition)
}

/// Loads every `*.yaml` / `*.yml` file in `schema_dir`, sorted by file name.
pub fn load_table_definitions(
    schema_dir: &Path,
    project_root: &Path,
) -> Result<Vec<TableDefinition>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(schema_dir)? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        if path.is_file() && is_yaml {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        return Err(TvalError::Configuration(format!(
            "no YAML files found in schema_dir: {}",
            schema_dir.display()
        )));
    }

    let definitions = files
        .iter()
        .map(|path| load_table_definition(path, project_root))
        .collect::<Result<Vec<_>>>()?;
    info!(
        tables = definitions.len(),
        schema_dir = %schema_dir.display(),
        "Loaded table definitions"
    );
    Ok(definitions)
}

/// Loads the relations file.
pub fn load_relations(path: &Path) -> Result<Vec<RelationDefinition>> {
    let file: RelationsFile = read_yaml(path)?;
    info!(relations = file.relations.len(), path = %path.display(), "Loaded relations");
    Ok(file.relations)
}

static TYPE_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[A-Z][A-Z0-9_]*( [A-Z][A-Z0-9_]*)*(\(\d+(\s*,\s*\d+)?\))?$")
        .expect("Hard-coded regex pattern should be valid")
});

/// Checks one table definition for internal consistency.
///
/// Foreign-key targets are checked separately by
/// [`validate_foreign_key_targets`], since they need the other tables.
pub fn validate_table(def: &TableDefinition) -> Result<()> {
    let invalid = |message: String| TvalError::invalid_definition(&def.name, message);

    SqlSecurity::validate_identifier(&def.name)
        .map_err(|e| invalid(format!("invalid table name: {e}")))?;

    if def.columns.is_empty() {
        return Err(invalid("at least one column is required".to_string()));
    }

    let mut seen = HashSet::new();
    for column in &def.columns {
        SqlSecurity::validate_identifier(&column.name)
            .map_err(|e| invalid(format!("invalid column name: {e}")))?;
        if !seen.insert(column.name.as_str()) {
            return Err(invalid(format!("duplicate column '{}'", column.name)));
        }
        if !TYPE_REGEX.is_match(&column.data_type) {
            return Err(invalid(format!(
                "column '{}' has an invalid type '{}'",
                column.name, column.data_type
            )));
        }
        if let Some(format) = &column.format {
            if !column.is_temporal() {
                return Err(invalid(format!(
                    "format is only valid on DATE/TIMESTAMP/TIME columns: {} is {}",
                    column.name, column.data_type
                )));
            }
            SqlSecurity::validate_format_pattern(format)
                .map_err(|e| invalid(format!("column '{}': {e}", column.name)))?;
        }
        if column.has_range() {
            if !column.is_numeric() {
                return Err(invalid(format!(
                    "min/max are only valid on numeric columns: {} is {}",
                    column.name, column.data_type
                )));
            }
            for bound in [column.min, column.max].into_iter().flatten() {
                if !bound.is_finite() {
                    return Err(invalid(format!(
                        "column '{}' has a non-finite bound",
                        column.name
                    )));
                }
            }
            if let (Some(min), Some(max)) = (column.min, column.max) {
                if min > max {
                    return Err(invalid(format!(
                        "column '{}' has min {min} greater than max {max}",
                        column.name
                    )));
                }
            }
        }
    }

    let require_columns = |label: &str, columns: &[String]| -> Result<()> {
        if columns.is_empty() {
            return Err(invalid(format!("{label} must list at least one column")));
        }
        for column in columns {
            if !def.has_column(column) {
                return Err(invalid(format!(
                    "{label} references unknown column '{column}'"
                )));
            }
        }
        Ok(())
    };

    if !def.constraints.primary_key.is_empty() {
        require_columns("primary_key", &def.constraints.primary_key)?;
    }
    for group in &def.constraints.unique {
        require_columns("unique", group)?;
    }
    for fk in &def.constraints.foreign_keys {
        require_columns("foreign_keys", &fk.columns)?;
        SqlSecurity::validate_identifier(&fk.references.table)
            .map_err(|e| invalid(format!("invalid foreign key target: {e}")))?;
        for column in &fk.references.columns {
            SqlSecurity::validate_identifier(column)
                .map_err(|e| invalid(format!("invalid foreign key target column: {e}")))?;
        }
        if fk.columns.len() != fk.references.columns.len() {
            return Err(invalid(format!(
                "foreign key to '{}' has {} local columns but {} target columns",
                fk.references.table,
                fk.columns.len(),
                fk.references.columns.len()
            )));
        }
    }
    for column in &def.partition_by {
        if !def.has_column(column) {
            return Err(invalid(format!(
                "export.partition_by references unknown column '{column}'"
            )));
        }
    }
    for rc in &def.row_conditions {
        SqlSecurity::validate_sql_expression(&rc.condition)
            .map_err(|e| invalid(format!("row condition '{}': {e}", rc.description)))?;
    }

    Ok(())
}

fn validate_source_dir(def: &TableDefinition, project_root: &Path) -> Result<()> {
    if !def.source_dir.is_dir() {
        return Err(TvalError::invalid_definition(
            &def.name,
            format!("source_dir does not exist: {}", def.source_dir.display()),
        ));
    }
    let resolved = def.source_dir.canonicalize()?;
    let root = project_root.canonicalize()?;
    if !resolved.starts_with(&root) {
        return Err(TvalError::invalid_definition(
            &def.name,
            format!(
                "source_dir must be inside the project root: {}",
                def.source_dir.display()
            ),
        ));
    }
    Ok(())
}

/// Checks that foreign keys name existing tables and columns.
pub fn validate_foreign_key_targets(tables: &[TableDefinition]) -> Result<()> {
    let by_name: HashMap<&str, &TableDefinition> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();

    for table in tables {
        for fk in &table.constraints.foreign_keys {
            let target = by_name.get(fk.references.table.as_str()).ok_or_else(|| {
                TvalError::UnknownReference {
                    table: table.name.clone(),
                    target: fk.references.table.clone(),
                }
            })?;
            for column in &fk.references.columns {
                if !target.has_column(column) {
                    return Err(TvalError::invalid_definition(
                        &table.name,
                        format!(
                            "foreign key references unknown column '{}.{column}'",
                            target.name
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Checks relation endpoints against the table definitions.
pub fn validate_relations(
    relations: &[RelationDefinition],
    tables: &[TableDefinition],
) -> Result<()> {
    let by_name: HashMap<&str, &TableDefinition> =
        tables.iter().map(|t| (t.name.as_str(), t)).collect();
    let mut names = HashSet::new();

    for rel in relations {
        if !names.insert(rel.name.as_str()) {
            return Err(TvalError::invalid_relation(&rel.name, "duplicate relation name"));
        }
        for (label, endpoint) in [("from", &rel.from), ("to", &rel.to)] {
            let table = by_name.get(endpoint.table.as_str()).ok_or_else(|| {
                TvalError::invalid_relation(
                    &rel.name,
                    format!("references undefined table in {label}: {}", endpoint.table),
                )
            })?;
            if endpoint.columns.is_empty() {
                return Err(TvalError::invalid_relation(
                    &rel.name,
                    format!("{label} must list at least one column"),
                ));
            }
            for column in &endpoint.columns {
                if !table.has_column(column) {
                    return Err(TvalError::invalid_relation(
                        &rel.name,
                        format!(
                            "references undefined column '{column}' in {label}.{}",
                            endpoint.table
                        ),
                    ));
                }
            }
        }
        if rel.from.columns.len() != rel.to.columns.len() {
            return Err(TvalError::invalid_relation(
                &rel.name,
                format!(
                    "from has {} columns but to has {}",
                    rel.from.columns.len(),
                    rel.to.columns.len()
                ),
            ));
        }
    }
    Ok(())
}
