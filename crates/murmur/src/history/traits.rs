//! Message log trait and record type.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::HistoryResult;

/// A message as persisted in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoredMessage {
    /// Time-ordered message id.
    pub id: String,
    #[sqlx(rename = "sender")]
    pub from: String,
    #[sqlx(rename = "recipient")]
    pub to: String,
    pub body: String,
    /// RFC 3339 timestamp (UTC).
    pub created_at: String,
}

impl StoredMessage {
    pub fn new(
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            from: from.into(),
            to: to.into(),
            body: body.into(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Whether this message belongs to the conversation between `a` and `b`.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }
}

/// Append-only store of routed messages.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Persist one message. Ids are unique; appending an existing id fails.
    async fn append(&self, message: &StoredMessage) -> HistoryResult<()>;

    /// The most recent `limit` messages exchanged between `a` and `b`,
    /// returned in ascending id order.
    async fn query_recent(&self, a: &str, b: &str, limit: i64)
    -> HistoryResult<Vec<StoredMessage>>;

    /// Remove every message sent or received by `identity`.
    /// Returns the number of deleted messages.
    async fn delete_user_messages(&self, identity: &str) -> HistoryResult<u64>;
}
