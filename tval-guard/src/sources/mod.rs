//! The load phase: creating tables, ingesting files and recording failures.
//!
//! Loading runs on the read-write [`LoadSession`](crate::core::LoadSession)
//! in dependency order. Its only product is a [`LoadOutcomes`] map; a table
//! with any recorded failure is tainted for the rest of the run.

pub mod encoding;
pub mod keys;
pub mod loader;
pub mod outcome;
pub mod spreadsheet;

pub use encoding::{
    detect_encoding, ensure_utf8, lookup_encoding, DecodeError, EncodingFallback, Utf8Source,
};
pub use keys::verify_keys;
pub use loader::{create_table_sql, create_tables, load_all, load_table, LoadOptions};
pub use outcome::{LoadFailure, LoadFailureKind, LoadOutcome, LoadOutcomes};
pub use spreadsheet::{read_first_sheet, SheetError};
