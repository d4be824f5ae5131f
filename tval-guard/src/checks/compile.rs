//! Compilation of declarative column rules into check queries.
//!
//! Everything here is a pure function of the definitions. Identifiers were
//! validated when the schema was loaded and are always emitted quoted;
//! values travel as `$n` parameters, never as SQL text.

use crate::schema::{
    CheckDefinition, CheckParam, ColumnDefinition, RowCondition, TableDefinition,
    TABLE_PLACEHOLDER,
};
use crate::security::quote_identifier;

/// The primary and aggregate checks of one table, in execution order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledChecks {
    pub primary: Vec<CheckDefinition>,
    pub aggregate: Vec<CheckDefinition>,
}

/// Compiles every rule of a table.
///
/// Primary checks come in a fixed order: allowed-value checks, range
/// checks, row conditions, then user checks, each in declaration order.
pub fn compile_table(def: &TableDefinition) -> CompiledChecks {
    let primary = def
        .columns
        .iter()
        .filter_map(allowed_values_check)
        .chain(def.columns.iter().filter_map(range_check))
        .chain(def.row_conditions.iter().map(row_condition_check))
        .chain(def.checks.iter().cloned())
        .collect();

    CompiledChecks {
        primary,
        aggregate: def.aggregate_checks.clone(),
    }
}

/// Counts non-null values outside the allowed set.
///
/// Allowed values are compared in the column's own type, so `2` matches a
/// DOUBLE `2.0` and `1.5` a DECIMAL `1.50`.
pub fn allowed_values_check(column: &ColumnDefinition) -> Option<CheckDefinition> {
    if column.allowed_values.is_empty() {
        return None;
    }
    let qcol = quote_identifier(&column.name);
    let data_type = &column.data_type;
    let placeholders = (1..=column.allowed_values.len())
        .map(|i| format!("CAST(${i} AS {data_type})"))
        .collect::<Vec<_>>()
        .join(", ");

    Some(
        CheckDefinition::new(
            format!(
                "{}({}) allowed values check",
                column.logical_name, column.name
            ),
            format!(
                "SELECT COUNT(*) FROM {TABLE_PLACEHOLDER} WHERE {qcol} NOT IN ({placeholders}) AND {qcol} IS NOT NULL"
            ),
        )
        .with_params(
            column
                .allowed_values
                .iter()
                .cloned()
                .map(CheckParam::Text)
                .collect(),
        ),
    )
}

/// Counts non-null values below `min` or above `max`.
pub fn range_check(column: &ColumnDefinition) -> Option<CheckDefinition> {
    if !column.has_range() {
        return None;
    }
    let qcol = quote_identifier(&column.name);
    let mut conditions = Vec::new();
    let mut labels = Vec::new();
    let mut params = Vec::new();

    if let Some(min) = column.min {
        params.push(CheckParam::Float(min));
        conditions.push(format!(
            "CAST({qcol} AS DOUBLE) < CAST(${} AS DOUBLE)",
            params.len()
        ));
        labels.push(format!("min={min}"));
    }
    if let Some(max) = column.max {
        params.push(CheckParam::Float(max));
        conditions.push(format!(
            "CAST({qcol} AS DOUBLE) > CAST(${} AS DOUBLE)",
            params.len()
        ));
        labels.push(format!("max={max}"));
    }

    Some(
        CheckDefinition::new(
            format!(
                "{}({}) range check ({})",
                column.logical_name,
                column.name,
                labels.join(", ")
            ),
            format!(
                "SELECT COUNT(*) FROM {TABLE_PLACEHOLDER} WHERE ({}) AND {qcol} IS NOT NULL",
                conditions.join(" OR ")
            ),
        )
        .with_params(params),
    )
}

/// Counts rows for which the condition is false.
pub fn row_condition_check(condition: &RowCondition) -> CheckDefinition {
    CheckDefinition::new(
        condition.description.clone(),
        format!(
            "SELECT COUNT(*) FROM {TABLE_PLACEHOLDER} WHERE NOT ({})",
            condition.condition
        ),
    )
}

/// Counts key tuples that occur more than once. Rows with a NULL in any
/// key column are ignored when `skip_nulls` is set.
pub fn uniqueness_sql(table: &str, columns: &[String], skip_nulls: bool) -> String {
    let cols = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let filter = if skip_nulls {
        format!(
            " WHERE {}",
            columns
                .iter()
                .map(|c| format!("{} IS NOT NULL", quote_identifier(c)))
                .collect::<Vec<_>>()
                .join(" AND ")
        )
    } else {
        String::new()
    };
    format!(
        "SELECT COUNT(*) FROM (SELECT {cols} FROM {}{filter} GROUP BY {cols} HAVING COUNT(*) > 1) AS dup",
        quote_identifier(table)
    )
}

/// Counts source rows with a fully non-null key that has no match in the
/// target. NULL keys never count as violations.
pub fn referential_sql(
    source_table: &str,
    source_columns: &[String],
    target_table: &str,
    target_columns: &[String],
) -> String {
    let join = source_columns
        .iter()
        .zip(target_columns)
        .map(|(s, t)| format!("s.{} = t.{}", quote_identifier(s), quote_identifier(t)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let source_not_null = source_columns
        .iter()
        .map(|s| format!("s.{} IS NOT NULL", quote_identifier(s)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let target_missing = target_columns
        .iter()
        .map(|t| format!("t.{} IS NULL", quote_identifier(t)))
        .collect::<Vec<_>>()
        .join(" AND ");

    format!(
        "SELECT COUNT(*) FROM {} s LEFT JOIN {} t ON {join} WHERE {source_not_null} AND {target_missing}",
        quote_identifier(source_table),
        quote_identifier(target_table)
    )
}

/// Counts rows with a NULL in any of `columns`.
pub fn null_count_sql(table: &str, columns: &[String]) -> String {
    format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        quote_identifier(table),
        columns
            .iter()
            .map(|c| format!("{} IS NULL", quote_identifier(c)))
            .collect::<Vec<_>>()
            .join(" OR ")
    )
}
