//! Durable log errors.

use thiserror::Error;

/// Result type for log operations.
pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Debug, Error)]
pub enum HistoryError {
    /// The database rejected or failed the statement.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The call did not finish within the configured bound.
    #[error("log operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        assert_eq!(
            HistoryError::Timeout(Duration::from_secs(5)).to_string(),
            "log operation timed out after 5s"
        );
        assert_eq!(
            HistoryError::Backend("disk full".to_string()).to_string(),
            "backend error: disk full"
        );
    }
}
