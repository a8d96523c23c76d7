//! Murmur: a real-time messaging relay.
//!
//! Authenticated users hold WebSocket connections to the hub. Chat frames are
//! persisted to a durable log, fanned out to every live connection of both
//! participants, and offered to the market-data bot.

pub mod api;
pub mod auth;
pub mod bot;
pub mod config;
pub mod db;
pub mod history;
pub mod msgid;
pub mod user;
pub mod ws;
