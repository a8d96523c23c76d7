//! Connection registry and fan-out.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::types::Frame;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Receiving side of a connection's outbound queue, owned by the write pump.
pub type OutboundReceiver = mpsc::Receiver<Arc<Frame>>;

/// Why a frame could not be queued for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity; the frame was dropped.
    Full,
    /// The connection has been torn down.
    Closed,
}

/// Handle to one live connection.
///
/// Cheap to clone. All clones share the outbound queue and the close signal.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: u64,
    identity: Arc<str>,
    outbound: mpsc::Sender<Arc<Frame>>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a connection for `identity` with an outbound queue of `capacity`.
    pub fn new(identity: &str, capacity: usize) -> (Self, OutboundReceiver) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            identity: Arc::from(identity),
            outbound,
            closed: CancellationToken::new(),
        };
        (handle, rx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Queue a frame without waiting.
    pub fn try_send(&self, frame: Arc<Frame>) -> Result<(), EnqueueError> {
        if self.is_closed() {
            return Err(EnqueueError::Closed);
        }
        self.outbound.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Queue a frame, waiting for space unless the connection closes first.
    ///
    /// Only used for replies to the connection's own requests, where waiting
    /// on the requester's queue is the desired backpressure.
    pub async fn send(&self, frame: Arc<Frame>) -> Result<(), EnqueueError> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => Err(EnqueueError::Closed),
            result = self.outbound.send(frame) => result.map_err(|_| EnqueueError::Closed),
        }
    }

    /// Fire the close signal. Both pumps observe it.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection is torn down.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Outcome of a fan-out to one identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the frame was queued on.
    pub delivered: usize,
    /// Connections whose queue was full or closed.
    pub dropped: usize,
}

impl std::ops::AddAssign for DeliveryReport {
    fn add_assign(&mut self, other: Self) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

/// Registry of live connections, keyed by identity.
///
/// The map is sharded: deliveries only take shard read locks, so concurrent
/// fan-outs never serialize against each other, only against register and
/// unregister on the same shard.
#[derive(Debug)]
pub struct Hub {
    connections: DashMap<String, Vec<ConnectionHandle>>,
    outbound_capacity: usize,
}

impl Hub {
    pub fn new(outbound_capacity: usize) -> Self {
        Self {
            connections: DashMap::new(),
            outbound_capacity,
        }
    }

    /// Create a connection using the hub's queue capacity. Not registered yet.
    pub fn open_connection(&self, identity: &str) -> (ConnectionHandle, OutboundReceiver) {
        ConnectionHandle::new(identity, self.outbound_capacity)
    }

    /// Add a live connection. Several connections per identity are allowed.
    pub fn register(&self, conn: &ConnectionHandle) {
        let mut conns = self
            .connections
            .entry(conn.identity().to_string())
            .or_default();
        conns.push(conn.clone());
        info!(
            "Registered connection {} for user {} ({} total)",
            conn.id(),
            conn.identity(),
            conns.len()
        );
    }

    /// Remove exactly this connection and close it.
    ///
    /// Drops the identity entry once its last connection is gone. Calling it
    /// again for the same connection is a no-op apart from the close, which
    /// is itself idempotent. Returns whether the connection was registered.
    pub fn unregister(&self, conn: &ConnectionHandle) -> bool {
        let removed = match self.connections.entry(conn.identity().to_string()) {
            Entry::Occupied(mut entry) => {
                let before = entry.get().len();
                entry.get_mut().retain(|c| c.id() != conn.id());
                let removed = entry.get().len() != before;
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
            Entry::Vacant(_) => false,
        };

        if removed {
            info!(
                "Unregistered connection {} for user {}",
                conn.id(),
                conn.identity()
            );
        }

        // Last step: nothing can be queued on it from here on.
        conn.close();
        removed
    }

    /// Queue `frame` on every live connection of `identity`.
    ///
    /// Never blocks. A connection with a full queue loses this frame only.
    pub fn deliver(&self, identity: &str, frame: Arc<Frame>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let Some(conns) = self.connections.get(identity) else {
            debug!("No live connections for {}, frame {} not delivered", identity, frame.id);
            return report;
        };

        for conn in conns.iter() {
            match conn.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(EnqueueError::Full) => {
                    warn!(
                        "Outbound queue full for connection {} of {}, dropping frame {}",
                        conn.id(),
                        identity,
                        frame.id
                    );
                    report.dropped += 1;
                }
                Err(EnqueueError::Closed) => report.dropped += 1,
            }
        }
        report
    }

    /// Number of live connections for `identity`.
    pub fn connection_count(&self, identity: &str) -> usize {
        self.connections.get(identity).map_or(0, |conns| conns.len())
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.connection_count(identity) > 0
    }

    /// Identities with at least one live connection, sorted.
    pub fn online_identities(&self) -> Vec<String> {
        let mut identities: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        identities.sort();
        identities
    }

    /// Live connections across all identities.
    pub fn total_connections(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Fire the close signal of every live connection.
    ///
    /// The sessions unregister themselves as their pumps stop. Returns the
    /// number of connections signalled.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for entry in self.connections.iter() {
            for conn in entry.value() {
                conn.close();
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::types::FrameKind;

    fn frame(body: &str) -> Arc<Frame> {
        Arc::new(Frame::new(FrameKind::Chat, "id", "alice", "bob", body))
    }

    #[test]
    fn test_fan_out_reaches_every_connection() {
        let hub = Hub::new(8);
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let (conn, rx) = hub.open_connection("bob");
            hub.register(&conn);
            receivers.push(rx);
        }

        let report = hub.deliver("bob", frame("hi"));
        assert_eq!(report, DeliveryReport { delivered: 3, dropped: 0 });
        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap().body, "hi");
        }
    }

    #[test]
    fn test_deliver_to_offline_identity_is_silent() {
        let hub = Hub::new(8);
        assert_eq!(hub.deliver("nobody", frame("hi")), DeliveryReport::default());
    }

    #[test]
    fn test_full_queue_drops_only_for_that_connection() {
        let hub = Hub::new(1);
        let (slow, mut slow_rx) = hub.open_connection("bob");
        let (fast, mut fast_rx) = hub.open_connection("bob");
        hub.register(&slow);
        hub.register(&fast);

        // Fill the slow connection's only slot.
        slow.try_send(frame("backlog")).unwrap();

        let report = hub.deliver("bob", frame("new"));
        assert_eq!(report, DeliveryReport { delivered: 1, dropped: 1 });
        assert_eq!(fast_rx.try_recv().unwrap().body, "new");
        assert_eq!(slow_rx.try_recv().unwrap().body, "backlog");
        assert!(slow_rx.try_recv().is_err());
    }

    #[test]
    fn test_unregister_removes_exactly_one_instance() {
        let hub = Hub::new(8);
        let (a, _a_rx) = hub.open_connection("alice");
        let (b, mut b_rx) = hub.open_connection("alice");
        hub.register(&a);
        hub.register(&b);
        assert_eq!(hub.connection_count("alice"), 2);

        assert!(hub.unregister(&a));
        assert_eq!(hub.connection_count("alice"), 1);
        assert!(a.is_closed());
        assert!(!b.is_closed());

        // Idempotent.
        assert!(!hub.unregister(&a));
        assert_eq!(hub.connection_count("alice"), 1);

        assert_eq!(hub.deliver("alice", frame("still here")).delivered, 1);
        assert_eq!(b_rx.try_recv().unwrap().body, "still here");
    }

    #[test]
    fn test_last_unregister_drops_identity() {
        let hub = Hub::new(8);
        let (conn, _rx) = hub.open_connection("alice");
        hub.register(&conn);
        assert!(hub.is_online("alice"));
        assert_eq!(hub.online_identities(), vec!["alice".to_string()]);

        hub.unregister(&conn);
        assert!(!hub.is_online("alice"));
        assert!(hub.online_identities().is_empty());
        assert_eq!(hub.total_connections(), 0);
    }

    #[test]
    fn test_close_all_signals_every_connection() {
        let hub = Hub::new(8);
        let (a, _a_rx) = hub.open_connection("alice");
        let (b, _b_rx) = hub.open_connection("bob");
        hub.register(&a);
        hub.register(&b);

        assert_eq!(hub.close_all(), 2);
        assert!(a.is_closed());
        assert!(b.is_closed());
    }

    #[test]
    fn test_closed_connection_refuses_frames() {
        let (conn, _rx) = ConnectionHandle::new("alice", 4);
        conn.close();
        assert_eq!(conn.try_send(frame("late")), Err(EnqueueError::Closed));
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let (a, _) = ConnectionHandle::new("alice", 1);
        let (b, _) = ConnectionHandle::new("alice", 1);
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn test_send_waits_for_space_until_closed() {
        let (conn, mut rx) = ConnectionHandle::new("alice", 1);
        conn.send(frame("first")).await.unwrap();

        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(frame("second")).await })
        };
        assert_eq!(rx.recv().await.unwrap().body, "first");
        waiter.await.unwrap().unwrap();
        assert_eq!(rx.recv().await.unwrap().body, "second");

        conn.send(frame("third")).await.unwrap();
        let blocked = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.send(frame("fourth")).await })
        };
        conn.close();
        assert_eq!(blocked.await.unwrap(), Err(EnqueueError::Closed));
    }

    #[tokio::test]
    async fn test_concurrent_register_unregister_stays_consistent() {
        let hub = Arc::new(Hub::new(4));
        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let hub = hub.clone();
                tokio::spawn(async move {
                    let identity = format!("user-{}", i % 4);
                    for _ in 0..50 {
                        let (conn, _rx) = hub.open_connection(&identity);
                        hub.register(&conn);
                        hub.deliver(&identity, frame("x"));
                        tokio::task::yield_now().await;
                        assert!(hub.unregister(&conn));
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(hub.total_connections(), 0);
        assert!(hub.online_identities().is_empty());
    }
}
