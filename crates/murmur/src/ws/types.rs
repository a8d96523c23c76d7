//! Wire frames exchanged over the WebSocket.

use serde::{Deserialize, Serialize};

use crate::history::StoredMessage;

/// Frame classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameKind {
    /// A message between two identities.
    Chat,
    /// Inbound: history request for the peer in `to`.
    /// Outbound: one replayed message.
    History,
    /// Server or bot generated text.
    System,
    /// Any kind this server does not understand.
    #[serde(other)]
    Unknown,
}

/// A single JSON frame.
///
/// On inbound frames `id` and `from` are ignored; the server stamps both.
/// Outbound frames always carry an `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: FrameKind,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub body: String,
}

impl Frame {
    pub fn new(
        kind: FrameKind,
        id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            id: id.into(),
            from: from.into(),
            to: to.into(),
            body: body.into(),
        }
    }

    /// A replayed log entry.
    pub fn replay(message: &StoredMessage) -> Self {
        Self::new(
            FrameKind::History,
            &message.id,
            &message.from,
            &message.to,
            &message.body,
        )
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
