//! WebSocket hub for one-to-one chat.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   frames    ┌──────────────┐  append   ┌──────────────┐
//! │  read pump   │────────────▶│    router    │──────────▶│ message log  │
//! │ (per socket) │             │              │◀──────────│   (sqlite)   │
//! └──────▲───────┘             └──┬────────┬──┘  history  └──────────────┘
//!        │                        │        │
//!        │ socket                 │deliver │ /commands
//!        │                        ▼        ▼
//! ┌──────┴───────┐  queue   ┌──────────┐  ┌─────────┐
//! │  write pump  │◀─────────│   hub    │  │   bot   │
//! │ (per socket) │          │ identity │  │         │
//! └──────────────┘          │ → conns  │  └─────────┘
//!                           └──────────┘
//! ```
//!
//! - Every identity may hold several connections (devices).
//! - A chat frame is persisted first, then queued on every live connection
//!   of both participants. Offline users read it later as history.
//! - Per-connection queues are bounded; a slow reader loses frames instead
//!   of stalling everyone else.

mod handler;
mod hub;
mod router;
mod session;
mod types;

pub use handler::ws_handler;
pub use hub::{ConnectionHandle, DeliveryReport, EnqueueError, Hub, OutboundReceiver};
pub use router::{BOT_IDENTITY, MessageRouter, RouterSettings, SYSTEM_IDENTITY};
pub use session::{SessionEnd, SessionSettings, run_session};
pub use types::{Frame, FrameKind};
