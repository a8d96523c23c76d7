//! SQLite implementation of the message log.

use async_trait::async_trait;
use log::debug;
use sqlx::SqlitePool;

use super::{HistoryResult, MessageLog, StoredMessage};
use crate::db::Database;

/// Message log backed by the `messages` table.
#[derive(Debug, Clone)]
pub struct SqliteMessageLog {
    pool: SqlitePool,
}

impl SqliteMessageLog {
    pub fn new(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
        }
    }

    /// Total number of stored messages.
    pub async fn count(&self) -> HistoryResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn append(&self, message: &StoredMessage) -> HistoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, sender, recipient, body, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.from)
        .bind(&message.to)
        .bind(&message.body)
        .bind(&message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_recent(
        &self,
        a: &str,
        b: &str,
        limit: i64,
    ) -> HistoryResult<Vec<StoredMessage>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut messages = sqlx::query_as::<_, StoredMessage>(
            r#"
            SELECT id, sender, recipient, body, created_at
            FROM messages
            WHERE (sender = ?1 AND recipient = ?2)
               OR (sender = ?2 AND recipient = ?1)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(a)
        .bind(b)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        messages.reverse();
        debug!("Loaded {} messages between {} and {}", messages.len(), a, b);
        Ok(messages)
    }

    async fn delete_user_messages(&self, identity: &str) -> HistoryResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE sender = ?1 OR recipient = ?1")
            .bind(identity)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgid::MessageIdGenerator;
    use chrono::Utc;

    async fn log() -> SqliteMessageLog {
        let db = Database::in_memory().await.unwrap();
        SqliteMessageLog::new(&db)
    }

    async fn send(
        log: &SqliteMessageLog,
        ids: &MessageIdGenerator,
        from: &str,
        to: &str,
        body: &str,
    ) -> StoredMessage {
        let message = StoredMessage::new(ids.next_id(), from, to, body, Utc::now());
        log.append(&message).await.unwrap();
        message
    }

    #[tokio::test]
    async fn test_query_returns_both_directions_in_order() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        let m1 = send(&log, &ids, "alice", "bob", "hi").await;
        let m2 = send(&log, &ids, "bob", "alice", "hey").await;
        let m3 = send(&log, &ids, "alice", "bob", "how are you").await;

        let history = log.query_recent("alice", "bob", 50).await.unwrap();
        assert_eq!(history, vec![m1.clone(), m2.clone(), m3.clone()]);

        // Argument order does not matter.
        let reversed = log.query_recent("bob", "alice", 50).await.unwrap();
        assert_eq!(reversed, history);
    }

    #[tokio::test]
    async fn test_query_filters_by_pair() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        send(&log, &ids, "alice", "bob", "for bob").await;
        send(&log, &ids, "alice", "carol", "for carol").await;
        send(&log, &ids, "bot", "alice", "quote").await;
        send(&log, &ids, "carol", "bob", "carol to bob").await;

        let history = log.query_recent("alice", "bob", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history.iter().all(|m| m.is_between("alice", "bob")));
        assert_eq!(history[0].body, "for bob");
    }

    #[tokio::test]
    async fn test_query_keeps_most_recent_within_limit() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        let mut sent = Vec::new();
        for i in 0..60 {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            sent.push(send(&log, &ids, from, to, &format!("message {i}")).await);
        }

        let history = log.query_recent("alice", "bob", 50).await.unwrap();
        assert_eq!(history.len(), 50);
        assert_eq!(history, sent[10..].to_vec());
        for pair in history.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[tokio::test]
    async fn test_query_with_non_positive_limit_is_empty() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        send(&log, &ids, "alice", "bob", "hi").await;
        assert!(log.query_recent("alice", "bob", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_self_conversation() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        send(&log, &ids, "alice", "alice", "note to self").await;
        send(&log, &ids, "alice", "bob", "hi").await;

        let history = log.query_recent("alice", "alice", 50).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].body, "note to self");
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let log = log().await;
        let message = StoredMessage::new("fixed-id", "alice", "bob", "hi", Utc::now());
        log.append(&message).await.unwrap();
        assert!(log.append(&message).await.is_err());
        assert_eq!(log.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_messages() {
        let log = log().await;
        let ids = MessageIdGenerator::new();
        send(&log, &ids, "alice", "bob", "1").await;
        send(&log, &ids, "bob", "alice", "2").await;
        send(&log, &ids, "bob", "carol", "3").await;

        assert_eq!(log.delete_user_messages("alice").await.unwrap(), 2);
        assert!(log.query_recent("alice", "bob", 50).await.unwrap().is_empty());
        assert_eq!(log.query_recent("bob", "carol", 50).await.unwrap().len(), 1);
    }
}
