//! Bot error types.

use std::time::Duration;
use thiserror::Error;

/// Result type for market-data operations.
pub type BotResult<T> = Result<T, BotError>;

#[derive(Debug, Error)]
pub enum BotError {
    /// HTTP request failed.
    #[error("request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The market-data service answered with a non-success status.
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The command did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Anything else reported by a market-data backend.
    #[error("{0}")]
    Backend(String),
}
