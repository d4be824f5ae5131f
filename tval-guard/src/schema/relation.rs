//! Cross-table relationship definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared multiplicity between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cardinality {
    #[serde(rename = "1:1")]
    OneToOne,
    #[serde(rename = "1:N")]
    OneToMany,
    #[serde(rename = "N:1")]
    ManyToOne,
    #[serde(rename = "N:N")]
    ManyToMany,
}

impl Cardinality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::ManyToMany => "N:N",
        }
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEndpoint {
    pub table: String,
    pub columns: Vec<String>,
}

impl RelationEndpoint {
    pub fn new<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub cardinality: Cardinality,
    pub from: RelationEndpoint,
    pub to: RelationEndpoint,
}

impl RelationDefinition {
    pub fn new(
        name: impl Into<String>,
        cardinality: Cardinality,
        from: RelationEndpoint,
        to: RelationEndpoint,
    ) -> Self {
        Self {
            name: name.into(),
            cardinality,
            from,
            to,
        }
    }

    /// Both endpoint table names, `from` first.
    pub fn tables(&self) -> [&str; 2] {
        [self.from.table.as_str(), self.to.table.as_str()]
    }
}

/// Top-level layout of `relations.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RelationsFile {
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}
