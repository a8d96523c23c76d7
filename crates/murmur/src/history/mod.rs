//! Durable message log.
//!
//! The log is the source of truth for history replay. The live path appends
//! every routed frame exactly once and reads the most recent slice of a
//! conversation back on demand.

mod error;
mod sqlite;
mod traits;

pub use error::{HistoryError, HistoryResult};
pub use sqlite::SqliteMessageLog;
pub use traits::{MessageLog, StoredMessage};
