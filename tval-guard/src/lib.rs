//! # tval-guard - Batch validation of tabular data files
//!
//! tval-guard loads a batch of CSV and Parquet files into an embedded
//! DataFusion session, validates every table against declarative YAML
//! rules, checks the declared cross-table relationships, and only then
//! allows the batch to be exported.
//!
//! ## Overview
//!
//! A run moves through fixed stages:
//!
//! 1. Table and relationship definitions are loaded and cross-validated
//!    into a [`schema::SchemaModel`].
//! 2. The [`resolver::DependencyResolver`] orders tables so every table is
//!    loaded after the tables its foreign keys reference.
//! 3. The load phase creates and fills the tables on a read-write
//!    [`core::LoadSession`] and records a [`sources::LoadOutcome`] per table.
//! 4. The read-write handle is turned into a [`core::ReadOnlySession`] and
//!    the [`checks::CheckEngine`] runs every table's rules.
//! 5. The [`relations::RelationValidator`] checks each relationship's
//!    cardinality, skipping relationships whose tables are already bad.
//! 6. The [`aggregate::StatusAggregator`] opens or closes the export gate
//!    for the whole batch at once.
//!
//! Every check ends in one of four statuses: `OK`, `NG` (violations found),
//! `ERROR` (the query failed) or `SKIPPED` (the input was unreliable).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tval_guard::prelude::*;
//! use tval_guard::formatters::HumanFormatter;
//!
//! # async fn example() -> tval_guard::Result<()> {
//! let report = run(RunOptions::new(Some("tval/config.yaml".into()), false)).await?;
//! println!("{}", HumanFormatter::new().format(&report)?);
//! if !report.passed() {
//!     std::process::exit(1);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Checking tables directly
//!
//! The engine works on any DataFusion context, which is how it is tested:
//!
//! ```rust
//! use tval_guard::prelude::*;
//! use tval_guard::schema::{ColumnDefinition, TableDefinition};
//! use datafusion::prelude::SessionContext;
//!
//! # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
//! let ctx = SessionContext::new();
//! // ... register a "users" table ...
//! let session = ReadOnlySession::from_context(ctx);
//! let users = TableDefinition::new(
//!     "users",
//!     vec![ColumnDefinition::new("age", "INTEGER").with_range(Some(0.0), Some(150.0))],
//! );
//! let results = CheckEngine::new(&session).run_table(&users, &[]).await;
//! for check in &results.checks {
//!     println!("{} {}", check.status, check.description);
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod checks;
pub mod config;
pub mod core;
pub mod error;
pub mod export;
pub mod formatters;
pub mod logging;
pub mod pipeline;
pub mod prelude;
pub mod profiler;
pub mod relations;
pub mod report;
pub mod resolver;
pub mod scaffold;
pub mod schema;
pub mod security;
pub mod sources;

pub use error::{Result, TvalError};
