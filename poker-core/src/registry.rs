//! ConnectionRegistry: live connections grouped by room
//!
//! The registry owns one [`ConnectionHandle`] per live connection. A handle
//! wraps the sending half of a bounded queue; the connection's writer task
//! drains the other half into the socket. Dropping a handle closes the queue,
//! which ends the writer.
//!
//! Broadcasts snapshot the room's handles under the read lock and deliver
//! after releasing it, so concurrent register/unregister calls never block
//! on a slow member and a member is never skipped or served twice.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, trace, warn};

use crate::connection::{ConnectionContext, ConnectionId};
use crate::protocol::FrameKind;
use crate::room::RoomId;

/// Default bound on a single delivery into a connection's queue
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of a connection's outbound queue
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// One frame queued for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub payload: String,
    pub kind: FrameKind,
}

impl Outbound {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            kind: FrameKind::Text,
        }
    }
}

/// Registry entry for one live connection
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    context: ConnectionContext,
    sender: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving half for the connection's writer
    pub fn channel(
        context: ConnectionContext,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { context, sender }, receiver)
    }

    pub fn id(&self) -> ConnectionId {
        self.context.id
    }

    pub fn room(&self) -> &RoomId {
        &self.context.room
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }
}

/// Why a member was dropped during a broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// The writer is gone
    Closed,
    /// The queue stayed full for longer than the write timeout
    TimedOut,
}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members that accepted the frame
    pub delivered: usize,
    /// Members removed because delivery failed
    pub dropped: Vec<(ConnectionId, DeliveryFailure)>,
}

/// Concurrency-safe table of live connections keyed by room
pub struct ConnectionRegistry {
    rooms: RwLock<HashMap<RoomId, HashMap<ConnectionId, ConnectionHandle>>>,
    write_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(write_timeout: Duration) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            write_timeout,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Add a connection under its room
    pub async fn register(&self, handle: ConnectionHandle) {
        let room = handle.room().clone();
        let id = handle.id();
        let mut rooms = self.rooms.write().await;
        rooms.entry(room.clone()).or_default().insert(id, handle);
        debug!(room = %room, connection = %id, "Connection registered");
    }

    /// Remove a connection; returns false if it was not registered
    ///
    /// Safe to call any number of times. Rooms left empty are dropped.
    pub async fn unregister(&self, room: &RoomId, id: ConnectionId) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(room) else {
            return false;
        };
        let removed = members.remove(&id).is_some();
        if members.is_empty() {
            rooms.remove(room);
        }
        if removed {
            debug!(room = %room, connection = %id, "Connection unregistered");
        }
        removed
    }

    /// Deliver `payload` to every connection currently in `room`
    ///
    /// Each delivery is bounded by the write timeout. A member whose queue is
    /// closed or stays full is unregistered; the others are unaffected.
    pub async fn broadcast_to_room(
        &self,
        room: &RoomId,
        payload: &str,
        kind: FrameKind,
    ) -> BroadcastReport {
        let targets: Vec<(ConnectionId, mpsc::Sender<Outbound>)> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room) {
                Some(members) => members
                    .iter()
                    .map(|(id, handle)| (*id, handle.sender.clone()))
                    .collect(),
                None => Vec::new(),
            }
        };

        let timeout = self.write_timeout;
        let deliveries = targets.into_iter().map(|(id, sender)| {
            let frame = Outbound {
                payload: payload.to_string(),
                kind,
            };
            async move {
                let result = match sender.send_timeout(frame, timeout).await {
                    Ok(()) => Ok(()),
                    Err(SendTimeoutError::Closed(_)) => Err(DeliveryFailure::Closed),
                    Err(SendTimeoutError::Timeout(_)) => Err(DeliveryFailure::TimedOut),
                };
                (id, result)
            }
        });

        let mut report = BroadcastReport::default();
        for (id, result) in join_all(deliveries).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(failure) => {
                    warn!(room = %room, connection = %id, ?failure, "Dropping connection after failed delivery");
                    self.unregister(room, id).await;
                    report.dropped.push((id, failure));
                }
            }
        }

        trace!(room = %room, delivered = report.delivered, "Broadcast complete");
        report
    }

    /// Drop every connection, closing all writer queues
    pub async fn close_all(&self) -> usize {
        let mut rooms = self.rooms.write().await;
        let count = rooms.values().map(HashMap::len).sum();
        rooms.clear();
        count
    }

    pub async fn contains(&self, room: &RoomId, id: ConnectionId) -> bool {
        self.rooms
            .read()
            .await
            .get(room)
            .is_some_and(|members| members.contains_key(&id))
    }

    /// Total live connections across all rooms
    pub async fn connection_count(&self) -> usize {
        self.rooms.read().await.values().map(HashMap::len).sum()
    }

    pub async fn room_connection_count(&self, room: &RoomId) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashMap::len)
    }

    /// Rooms with at least one live connection
    pub async fn rooms(&self) -> Vec<RoomId> {
        self.rooms.read().await.keys().cloned().collect()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_WRITE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn room(n: u8) -> RoomId {
        let digit = char::from(b'0' + n);
        let raw = format!(
            "{0}{0}{0}{0}{0}{0}{0}{0}-{0}{0}{0}{0}-{0}{0}{0}{0}-{0}{0}{0}{0}-{0}{0}{0}{0}{0}{0}{0}{0}{0}{0}{0}{0}",
            digit
        );
        RoomId::parse(&raw).unwrap()
    }

    async fn join(
        registry: &ConnectionRegistry,
        room: &RoomId,
        capacity: usize,
    ) -> (ConnectionId, mpsc::Receiver<Outbound>) {
        let (handle, rx) =
            ConnectionHandle::channel(ConnectionContext::new(room.clone(), "user"), capacity);
        let id = handle.id();
        registry.register(handle).await;
        (id, rx)
    }

    #[tokio::test]
    async fn broadcast_reaches_only_room_members() {
        let registry = ConnectionRegistry::default();
        let (_, mut c1) = join(&registry, &room(1), 8).await;
        let (_, mut c2) = join(&registry, &room(1), 8).await;
        let (_, mut c3) = join(&registry, &room(2), 8).await;

        let report = registry
            .broadcast_to_room(&room(1), "5 votes cast", FrameKind::Text)
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(c1.recv().await.unwrap(), Outbound::text("5 votes cast"));
        assert_eq!(c2.recv().await.unwrap(), Outbound::text("5 votes cast"));
        assert!(c1.try_recv().is_err());
        assert!(c3.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_a_no_op() {
        let registry = ConnectionRegistry::default();
        let report = registry
            .broadcast_to_room(&room(3), "x", FrameKind::Text)
            .await;
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn broadcast_preserves_frame_kind() {
        let registry = ConnectionRegistry::default();
        let (_, mut rx) = join(&registry, &room(1), 8).await;

        registry
            .broadcast_to_room(&room(1), "bin", FrameKind::Binary)
            .await;

        assert_eq!(rx.recv().await.unwrap().kind, FrameKind::Binary);
    }

    #[tokio::test]
    async fn unregister_twice_is_a_no_op() {
        let registry = ConnectionRegistry::default();
        let (id, _rx) = join(&registry, &room(1), 8).await;

        assert!(registry.unregister(&room(1), id).await);
        assert!(!registry.unregister(&room(1), id).await);
        assert!(!registry.unregister(&room(2), id).await);
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn empty_rooms_are_dropped() {
        let registry = ConnectionRegistry::default();
        let (id, _rx) = join(&registry, &room(1), 8).await;
        assert_eq!(registry.rooms().await, vec![room(1)]);

        registry.unregister(&room(1), id).await;
        assert!(registry.rooms().await.is_empty());
    }

    #[tokio::test]
    async fn closed_member_is_removed_and_others_still_receive() {
        let registry = ConnectionRegistry::default();
        let (dead, dead_rx) = join(&registry, &room(1), 8).await;
        let (_, mut live) = join(&registry, &room(1), 8).await;
        drop(dead_rx);

        let report = registry
            .broadcast_to_room(&room(1), "hello", FrameKind::Text)
            .await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![(dead, DeliveryFailure::Closed)]);
        assert!(!registry.contains(&room(1), dead).await);
        assert_eq!(live.recv().await.unwrap().payload, "hello");
    }

    #[tokio::test]
    async fn stalled_member_times_out_without_blocking_the_room() {
        let registry = ConnectionRegistry::new(Duration::from_millis(50));
        let (stalled, _stalled_rx) = join(&registry, &room(1), 1).await;
        let (_, mut live) = join(&registry, &room(1), 8).await;

        // First frame fills the stalled queue, second cannot be enqueued
        registry
            .broadcast_to_room(&room(1), "one", FrameKind::Text)
            .await;
        let started = std::time::Instant::now();
        let report = registry
            .broadcast_to_room(&room(1), "two", FrameKind::Text)
            .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(report.dropped, vec![(stalled, DeliveryFailure::TimedOut)]);
        assert_eq!(live.recv().await.unwrap().payload, "one");
        assert_eq!(live.recv().await.unwrap().payload, "two");
    }

    #[tokio::test]
    async fn close_all_ends_every_writer_queue() {
        let registry = ConnectionRegistry::default();
        let (_, mut a) = join(&registry, &room(1), 8).await;
        let (_, mut b) = join(&registry, &room(2), 8).await;

        assert_eq!(registry.close_all().await, 2);
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn broadcast_is_exact_under_concurrent_churn() {
        let registry = Arc::new(ConnectionRegistry::default());
        let (_, mut stable) = join(&registry, &room(1), 256).await;
        let (_, mut outsider) = join(&registry, &room(2), 256).await;

        let churn = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..100 {
                    let (handle, rx) =
                        ConnectionHandle::channel(ConnectionContext::new(room(1), ""), 256);
                    let id = handle.id();
                    registry.register(handle).await;
                    tokio::task::yield_now().await;
                    registry.unregister(&room(1), id).await;
                    registry.unregister(&room(1), id).await;
                    drop(rx);
                }
            })
        };

        for n in 0..100 {
            registry
                .broadcast_to_room(&room(1), &n.to_string(), FrameKind::Text)
                .await;
        }
        churn.await.unwrap();

        for n in 0..100 {
            assert_eq!(stable.recv().await.unwrap().payload, n.to_string());
        }
        assert!(stable.try_recv().is_err(), "no duplicate deliveries");
        assert!(outsider.try_recv().is_err());
        assert_eq!(registry.room_connection_count(&room(1)).await, 1);
    }
}
