//! Inbound frame routing.

use chrono::Utc;
use log::{debug, error, warn};
use std::sync::Arc;
use std::time::Duration;

use super::hub::{ConnectionHandle, DeliveryReport, Hub};
use super::types::{Frame, FrameKind};
use crate::bot::BotService;
use crate::history::{HistoryError, MessageLog, StoredMessage};
use crate::msgid::MessageIdGenerator;

/// Reserved identity that authors bot replies.
pub const BOT_IDENTITY: &str = "bot";

/// Identity used for server-generated error frames.
pub const SYSTEM_IDENTITY: &str = "system";

/// Routing limits.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub history_limit: i64,
    pub query_timeout: Duration,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            history_limit: 50,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Classifies inbound frames and sequences persistence, delivery, history
/// replay and bot replies.
///
/// Frames from one connection are routed one at a time by its read pump, so
/// per-connection order is preserved end to end.
pub struct MessageRouter {
    hub: Arc<Hub>,
    log: Arc<dyn MessageLog>,
    ids: Arc<MessageIdGenerator>,
    bot: Option<BotService>,
    settings: RouterSettings,
}

impl MessageRouter {
    pub fn new(
        hub: Arc<Hub>,
        log: Arc<dyn MessageLog>,
        ids: Arc<MessageIdGenerator>,
        bot: Option<BotService>,
        settings: RouterSettings,
    ) -> Self {
        Self {
            hub,
            log,
            ids,
            bot,
            settings,
        }
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Route one decoded frame received on `conn`.
    pub async fn route(&self, conn: &ConnectionHandle, frame: Frame) {
        match frame.kind {
            FrameKind::History => self.replay_history(conn, frame.to.trim()).await,
            FrameKind::Chat => self.handle_chat(conn.identity(), frame).await,
            kind => warn!(
                "Ignoring {:?} frame from user {} on connection {}",
                kind,
                conn.identity(),
                conn.id()
            ),
        }
    }

    /// Send the recent conversation with `peer` to the requesting connection only.
    pub async fn replay_history(&self, conn: &ConnectionHandle, peer: &str) {
        if peer.is_empty() {
            warn!("History request without peer from user {}", conn.identity());
            return;
        }

        let query = self
            .log
            .query_recent(conn.identity(), peer, self.settings.history_limit);
        let result = match tokio::time::timeout(self.settings.query_timeout, query).await {
            Ok(result) => result,
            Err(_) => Err(HistoryError::Timeout(self.settings.query_timeout)),
        };

        match result {
            Ok(messages) => {
                debug!(
                    "Replaying {} messages between {} and {}",
                    messages.len(),
                    conn.identity(),
                    peer
                );
                for message in &messages {
                    if conn.send(Arc::new(Frame::replay(message))).await.is_err() {
                        debug!("Connection {} closed during history replay", conn.id());
                        return;
                    }
                }
            }
            Err(err) => {
                error!(
                    "History query between {} and {} failed: {}",
                    conn.identity(),
                    peer,
                    err
                );
                let notice = Frame::new(
                    FrameKind::System,
                    self.ids.next_id(),
                    SYSTEM_IDENTITY,
                    conn.identity(),
                    "Could not load message history. Please try again.",
                );
                let _ = conn.send(Arc::new(notice)).await;
            }
        }
    }

    /// Persist and deliver a chat frame from `sender`, then run the bot on it.
    ///
    /// The sender needs no live connection; the frame is persisted and
    /// delivered to the recipient regardless.
    pub async fn handle_chat(&self, sender: &str, frame: Frame) {
        let recipient = frame.to.trim();
        if recipient.is_empty() {
            warn!("Chat frame from user {} has no recipient, ignoring", sender);
            return;
        }

        let message = self
            .publish(FrameKind::Chat, sender, recipient, frame.body, &[sender, recipient])
            .await;

        let Some(bot) = &self.bot else {
            return;
        };
        if let Some(reply) = bot.respond(&message.body).await {
            self.publish(
                FrameKind::System,
                BOT_IDENTITY,
                &message.from,
                reply,
                &[message.from.as_str(), message.to.as_str()],
            )
            .await;
        }
    }

    /// Stamp, persist, then deliver a new frame to each distinct identity in
    /// `audience`.
    async fn publish(
        &self,
        kind: FrameKind,
        from: &str,
        to: &str,
        body: String,
        audience: &[&str],
    ) -> Arc<Frame> {
        let frame = Arc::new(Frame::new(kind, self.ids.next_id(), from, to, body));
        self.persist(&frame).await;

        let mut report = DeliveryReport::default();
        for (i, identity) in audience.iter().enumerate() {
            if audience[..i].contains(identity) {
                continue;
            }
            report += self.hub.deliver(identity, frame.clone());
        }
        debug!(
            "Frame {} from {} to {}: delivered={} dropped={}",
            frame.id, frame.from, frame.to, report.delivered, report.dropped
        );
        frame
    }

    /// Append to the log. Failures are logged; live delivery still happens.
    async fn persist(&self, frame: &Frame) {
        let message = StoredMessage::new(&frame.id, &frame.from, &frame.to, &frame.body, Utc::now());
        let append = self.log.append(&message);
        match tokio::time::timeout(self.settings.query_timeout, append).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!("Failed to persist message {}: {}", frame.id, err),
            Err(_) => error!(
                "Persisting message {} timed out after {:?}",
                frame.id, self.settings.query_timeout
            ),
        }
    }
}
