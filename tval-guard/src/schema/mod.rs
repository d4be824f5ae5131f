//! Table and relationship definitions.
//!
//! A [`SchemaModel`] is built once at startup, fully cross-validated, and
//! only read afterwards.

pub mod loader;
pub mod relation;
pub mod table;

pub use loader::{
    load_relations, load_table_definition, load_table_definitions, validate_foreign_key_targets,
    validate_relations, validate_table,
};
pub use relation::{Cardinality, RelationDefinition, RelationEndpoint};
pub use table::{
    CheckDefinition, CheckParam, ColumnDefinition, ConstraintSet, ForeignKey, ForeignKeyTarget,
    RowCondition, TableDefinition, TABLE_PLACEHOLDER,
};

use crate::error::{Result, TvalError};
use std::collections::HashSet;

/// Validated tables and relationships of one project.
#[derive(Debug, Clone)]
pub struct SchemaModel {
    tables: Vec<TableDefinition>,
    relations: Vec<RelationDefinition>,
}

impl SchemaModel {
    /// Cross-validates the definitions and builds the model.
    pub fn new(
        tables: Vec<TableDefinition>,
        relations: Vec<RelationDefinition>,
    ) -> Result<Self> {
        let mut names = HashSet::new();
        for table in &tables {
            if !names.insert(table.name.as_str()) {
                return Err(TvalError::invalid_definition(
                    &table.name,
                    "table name is defined more than once",
                ));
            }
            validate_table(table)?;
        }
        validate_foreign_key_targets(&tables)?;
        validate_relations(&relations, &tables)?;
        Ok(Self { tables, relations })
    }

    pub fn tables(&self) -> &[TableDefinition] {
        &self.tables
    }

    pub fn relations(&self) -> &[RelationDefinition] {
        &self.relations
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.iter().find(|t| t.name == name)
    }
}
