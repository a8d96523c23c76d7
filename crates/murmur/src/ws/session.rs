//! Per-connection read and write pumps.
//!
//! Each connection runs two loops. The read pump owns the receive half of the
//! socket and feeds decoded frames to the router. The write pump owns the send
//! half and the consumer side of the outbound queue, and keeps the peer alive
//! with periodic pings. Whichever loop ends first tears the connection down:
//! it is unregistered from the hub, which fires the close signal the other
//! loop is waiting on, and the transport is closed.

use axum::extract::ws::Message;
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::hub::{ConnectionHandle, OutboundReceiver};
use super::router::MessageRouter;
use super::types::Frame;
use crate::config::HubConfig;

/// Upper bound on a single socket write.
const WRITE_WAIT: Duration = Duration::from_secs(10);

/// Time the write pump gets to send its close frame after teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Keepalive timing for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub ping_interval: Duration,
    pub pong_wait: Duration,
}

impl From<&HubConfig> for SessionSettings {
    fn from(config: &HubConfig) -> Self {
        Self {
            ping_interval: config.ping_interval(),
            pong_wait: config.pong_wait(),
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame or the stream ended.
    ClientClosed,
    /// No pong within the liveness window.
    LivenessTimeout,
    /// The peer sent something that is not a frame.
    ProtocolError,
    /// Reading or writing the socket failed.
    TransportError,
    /// The close signal fired.
    Cancelled,
}

/// Run a registered session to completion.
///
/// Registers `conn` with the router's hub, runs both pumps, and unregisters
/// when either one ends.
pub async fn run_session<S>(
    socket: S,
    conn: ConnectionHandle,
    outbound: OutboundReceiver,
    router: Arc<MessageRouter>,
    settings: SessionSettings,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Sink<Message, Error = axum::Error>,
    S: Send + 'static,
{
    let hub = router.hub().clone();
    let (sink, stream) = socket.split();

    hub.register(&conn);

    let mut writer = tokio::spawn(write_pump(
        sink,
        outbound,
        conn.close_signal(),
        settings.ping_interval,
    ));

    let end = tokio::select! {
        end = read_pump(stream, &conn, &router, settings.pong_wait) => end,
        end = &mut writer => end.unwrap_or(SessionEnd::TransportError),
    };

    hub.unregister(&conn);

    if !writer.is_finished() && tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(
        "Connection {} for user {} closed: {:?}",
        conn.id(),
        conn.identity(),
        end
    );
}

async fn write_message<W>(sink: &mut W, message: Message) -> Result<(), String>
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    match tokio::time::timeout(WRITE_WAIT, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(_) => Err(format!("write timed out after {WRITE_WAIT:?}")),
    }
}

/// Drain the outbound queue to the socket and ping on an interval.
pub(crate) async fn write_pump<W>(
    mut sink: W,
    mut outbound: OutboundReceiver,
    closed: CancellationToken,
    ping_interval: Duration,
) -> SessionEnd
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // Pings go ahead of queued frames so a busy queue cannot starve keepalive.
    let end = loop {
        tokio::select! {
            biased;
            _ = closed.cancelled() => break SessionEnd::Cancelled,
            _ = ping.tick() => {
                if let Err(err) = write_message(&mut sink, Message::Ping(Default::default())).await {
                    debug!("Ping failed: {}", err);
                    closed.cancel();
                    return SessionEnd::TransportError;
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    break SessionEnd::Cancelled;
                };
                let json = match frame.to_json() {
                    Ok(json) => json,
                    Err(err) => {
                        warn!("Failed to serialize frame {}: {}", frame.id, err);
                        continue;
                    }
                };
                if let Err(err) = write_message(&mut sink, Message::Text(json.into())).await {
                    debug!("Write failed: {}", err);
                    closed.cancel();
                    return SessionEnd::TransportError;
                }
            }
        }
    };

    if write_message(&mut sink, Message::Close(None)).await.is_ok() {
        let _ = sink.close().await;
    }
    end
}

/// Decode inbound frames and hand them to the router, one at a time.
pub(crate) async fn read_pump<R, E>(
    mut stream: R,
    conn: &ConnectionHandle,
    router: &MessageRouter,
    pong_wait: Duration,
) -> SessionEnd
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let closed = conn.close_signal();
    let mut deadline = Instant::now() + pong_wait;

    loop {
        let next = tokio::select! {
            biased;
            _ = closed.cancelled() => return SessionEnd::Cancelled,
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        let message = match next {
            Err(_) => {
                info!(
                    "No pong from user {} within {:?}, closing connection {}",
                    conn.identity(),
                    pong_wait,
                    conn.id()
                );
                return SessionEnd::LivenessTimeout;
            }
            Ok(None) => return SessionEnd::ClientClosed,
            Ok(Some(Err(err))) => {
                warn!("WebSocket error for user {}: {}", conn.identity(), err);
                return SessionEnd::TransportError;
            }
            Ok(Some(Ok(message))) => message,
        };

        let decoded = match message {
            Message::Text(text) => serde_json::from_str::<Frame>(text.as_str()),
            Message::Binary(bytes) => serde_json::from_slice::<Frame>(&bytes),
            Message::Pong(_) => {
                deadline = Instant::now() + pong_wait;
                continue;
            }
            // Answered by the transport.
            Message::Ping(_) => continue,
            Message::Close(_) => {
                debug!("User {} closed connection {}", conn.identity(), conn.id());
                return SessionEnd::ClientClosed;
            }
        };

        match decoded {
            Ok(frame) => router.route(conn, frame).await,
            Err(err) => {
                warn!(
                    "Undecodable frame from user {}, closing connection {}: {}",
                    conn.identity(),
                    conn.id(),
                    err
                );
                return SessionEnd::ProtocolError;
            }
        }
    }
}
