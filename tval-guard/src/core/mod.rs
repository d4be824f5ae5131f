//! Status model, check results and query sessions.
//!
//! Every stage after the load phase talks to the engine through a
//! [`ReadOnlySession`] passed in explicitly; nothing here is global.

pub mod result;
pub mod session;
pub mod status;

pub use result::CheckResult;
pub use session::{LoadSession, QueryErrorKind, QueryFailure, ReadOnlySession};
pub use status::{CheckStatus, ExportStatus, TableStatus};
