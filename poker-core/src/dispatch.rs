//! Dispatcher: turns client frames into store mutations and room broadcasts
//!
//! For a given room, mutation and broadcast happen under one per-room lock,
//! so members observe broadcasts in exactly the order the store applied the
//! mutations. Different rooms proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use crate::connection::ConnectionContext;
use crate::error::{ProtocolError, StoreError};
use crate::protocol::{Action, ChangeCommand, FrameKind};
use crate::registry::{BroadcastReport, ConnectionRegistry};
use crate::room::RoomId;
use crate::store::RoomStore;

/// Hands out one sequential turn per room at a time
///
/// Lock entries are pruned as soon as nobody holds or waits on them.
#[derive(Default)]
pub struct RoomSequencer {
    locks: Mutex<HashMap<RoomId, Arc<AsyncMutex<()>>>>,
}

impl RoomSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `room`
    pub async fn acquire(&self, room: &RoomId) -> RoomTurn<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(room.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        RoomTurn {
            sequencer: self,
            room: room.clone(),
            guard: Some(guard),
        }
    }

    /// Rooms with an outstanding turn
    pub fn active_rooms(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn release(&self, room: &RoomId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(room)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(room);
        }
    }
}

/// Exclusive turn for one room; released on drop
pub struct RoomTurn<'a> {
    sequencer: &'a RoomSequencer,
    room: RoomId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RoomTurn<'_> {
    fn drop(&mut self) {
        // Release the room lock before deciding whether its entry can go
        drop(self.guard.take());
        self.sequencer.release(&self.room);
    }
}

/// What happened to one client command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The store applied the mutation and the result went to the room
    Broadcast {
        action: Action,
        report: BroadcastReport,
    },
    /// The command name is not a supported action
    Ignored { command: String },
    /// The store rejected or failed the mutation; nothing was broadcast
    StoreFailed { action: Action, error: StoreError },
}

/// Routes parsed commands to the store and fans results out to rooms
pub struct Dispatcher {
    store: Arc<dyn RoomStore>,
    registry: Arc<ConnectionRegistry>,
    sequencer: RoomSequencer,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn RoomStore>, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            store,
            registry,
            sequencer: RoomSequencer::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn RoomStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn sequencer(&self) -> &RoomSequencer {
        &self.sequencer
    }

    /// Parse one frame and apply it
    ///
    /// A malformed frame is returned as an error for the caller to act on;
    /// everything else is reported through [`DispatchOutcome`].
    pub async fn handle_frame(
        &self,
        ctx: &ConnectionContext,
        frame: &str,
        kind: FrameKind,
    ) -> Result<DispatchOutcome, ProtocolError> {
        let command = ChangeCommand::parse(frame)?;
        Ok(self.apply(ctx, &command, kind).await)
    }

    /// Apply a command for the connection's room and broadcast the result
    #[instrument(
        name = "dispatch::apply",
        skip(self, ctx, command, kind),
        fields(room = %ctx.room, connection = %ctx.id, command = %command.name)
    )]
    pub async fn apply(
        &self,
        ctx: &ConnectionContext,
        command: &ChangeCommand,
        kind: FrameKind,
    ) -> DispatchOutcome {
        let Some(action) = command.action() else {
            warn!("Ignoring unknown command");
            return DispatchOutcome::Ignored {
                command: command.name.clone(),
            };
        };

        let _turn = self.sequencer.acquire(&ctx.room).await;

        let result = self
            .store
            .execute_mutation(action, command.value_or_empty(), &ctx.room, &ctx.identity)
            .await;

        match result {
            Ok(payload) => {
                let report = self
                    .registry
                    .broadcast_to_room(&ctx.room, &payload, kind)
                    .await;
                debug!(
                    %action,
                    delivered = report.delivered,
                    dropped = report.dropped.len(),
                    "Mutation broadcast"
                );
                DispatchOutcome::Broadcast { action, report }
            }
            Err(error) => {
                warn!(%action, %error, "Mutation failed, skipping broadcast");
                DispatchOutcome::StoreFailed { action, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::registry::{ConnectionHandle, Outbound};
    use crate::store::{MockRoomStore, RoomRole};

    const ROOM_A: &str = "11111111-1111-1111-1111-111111111111";
    const ROOM_B: &str = "22222222-2222-2222-2222-222222222222";

    fn room(raw: &str) -> RoomId {
        RoomId::parse(raw).unwrap()
    }

    async fn join(
        registry: &ConnectionRegistry,
        room_id: &str,
        identity: &str,
    ) -> (ConnectionContext, mpsc::Receiver<Outbound>) {
        let ctx = ConnectionContext::new(room(room_id), identity);
        let (handle, rx) = ConnectionHandle::channel(ctx.clone(), 128);
        registry.register(handle).await;
        (ctx, rx)
    }

    fn dispatcher(store: Arc<dyn RoomStore>) -> (Dispatcher, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::default());
        (Dispatcher::new(store, Arc::clone(&registry)), registry)
    }

    #[tokio::test]
    async fn vote_is_broadcast_to_room_only() {
        let store = Arc::new(MockRoomStore::new());
        store.queue_response("5 votes cast");
        let (dispatcher, registry) = dispatcher(store.clone());

        let (c1, mut rx1) = join(&registry, ROOM_A, "c1@example.com").await;
        let (_c2, mut rx2) = join(&registry, ROOM_A, "c2@example.com").await;
        let (_c3, mut rx3) = join(&registry, ROOM_B, "c3@example.com").await;

        let outcome = dispatcher
            .handle_frame(&c1, "vote==5", FrameKind::Text)
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DispatchOutcome::Broadcast {
                action: Action::CastVote,
                ..
            }
        ));
        assert_eq!(rx1.recv().await.unwrap().payload, "5 votes cast");
        assert_eq!(rx2.recv().await.unwrap().payload, "5 votes cast");
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_err());
        assert!(rx3.try_recv().is_err());

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].action, Action::CastVote);
        assert_eq!(calls[0].value, "5");
        assert_eq!(calls[0].room, room(ROOM_A));
        assert_eq!(calls[0].identity, "c1@example.com");
    }

    #[tokio::test]
    async fn bare_command_submits_empty_value() {
        let store = Arc::new(MockRoomStore::new());
        let (dispatcher, registry) = dispatcher(store.clone());
        let (ctx, mut rx) = join(&registry, ROOM_A, "owner").await;

        dispatcher
            .handle_frame(&ctx, "reveal", FrameKind::Text)
            .await
            .unwrap();

        assert_eq!(store.calls()[0].value, "");
        assert_eq!(rx.recv().await.unwrap().payload, "reveal==");
    }

    #[tokio::test]
    async fn unknown_command_is_ignored_without_store_call() {
        let store = Arc::new(MockRoomStore::new());
        let (dispatcher, registry) = dispatcher(store.clone());
        let (ctx, mut rx) = join(&registry, ROOM_A, "dev").await;

        let outcome = dispatcher
            .handle_frame(&ctx, "shuffle==now", FrameKind::Text)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Ignored {
                command: "shuffle".to_string()
            }
        );
        assert!(store.calls().is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn store_failure_is_not_broadcast() {
        let store = Arc::new(MockRoomStore::new());
        store.queue_error(StoreError::Unavailable("connection reset".to_string()));
        let (dispatcher, registry) = dispatcher(store);
        let (ctx, mut rx) = join(&registry, ROOM_A, "dev").await;

        let outcome = dispatcher
            .handle_frame(&ctx, "vote==3", FrameKind::Text)
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::StoreFailed { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frame_is_a_protocol_error() {
        let store = Arc::new(MockRoomStore::new());
        let (dispatcher, registry) = dispatcher(store.clone());
        let (ctx, _rx) = join(&registry, ROOM_A, "dev").await;

        let err = dispatcher
            .handle_frame(&ctx, "a==b==c", FrameKind::Text)
            .await
            .unwrap_err();

        assert_eq!(err, ProtocolError::TooManyFields { fields: 3 });
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn sequencer_prunes_idle_rooms() {
        let store = Arc::new(MockRoomStore::new());
        let (dispatcher, registry) = dispatcher(store);
        let (ctx, _rx) = join(&registry, ROOM_A, "dev").await;

        dispatcher
            .handle_frame(&ctx, "vote==1", FrameKind::Text)
            .await
            .unwrap();

        assert_eq!(dispatcher.sequencer().active_rooms(), 0);
    }

    /// Numbers mutations in arrival order, sleeping a varying amount
    struct CountingStore {
        next: AtomicUsize,
    }

    #[async_trait]
    impl RoomStore for CountingStore {
        async fn execute_mutation(
            &self,
            _action: Action,
            _value: &str,
            _room: &RoomId,
            _identity: &str,
        ) -> Result<String, StoreError> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis((7 - (n % 7)) as u64)).await;
            Ok(n.to_string())
        }

        async fn room_exists(&self, _room: &RoomId) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn create_room(
            &self,
            _name: &str,
            _tasks: &[String],
            _creator: &str,
        ) -> Result<RoomId, StoreError> {
            Ok(RoomId::generate())
        }

        async fn room_role(&self, _room: &RoomId, _identity: &str) -> Result<RoomRole, StoreError> {
            Ok(RoomRole::Participant)
        }

        async fn verify_credentials(&self, _login: &str, _password: &str) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn record_connection(&self, _connection: &ConnectionContext) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commands_broadcast_in_mutation_order() {
        let store = Arc::new(CountingStore {
            next: AtomicUsize::new(0),
        });
        let (dispatcher, registry) = dispatcher(store);
        let dispatcher = Arc::new(dispatcher);
        let (_observer, mut rx) = join(&registry, ROOM_A, "observer").await;

        let mut handles = Vec::new();
        for voter in 0..30 {
            let dispatcher = Arc::clone(&dispatcher);
            let ctx = ConnectionContext::new(room(ROOM_A), format!("voter-{voter}"));
            handles.push(tokio::spawn(async move {
                dispatcher
                    .handle_frame(&ctx, "vote==5", FrameKind::Text)
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for expected in 0..30 {
            assert_eq!(rx.recv().await.unwrap().payload, expected.to_string());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rooms_are_not_serialized_against_each_other() {
        let store = Arc::new(MockRoomStore::new().with_delay(Duration::from_millis(200)));
        let (dispatcher, registry) = dispatcher(store);
        let dispatcher = Arc::new(dispatcher);
        let (a, _rx_a) = join(&registry, ROOM_A, "a").await;
        let (b, _rx_b) = join(&registry, ROOM_B, "b").await;

        let started = std::time::Instant::now();
        let first = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle_frame(&a, "vote==1", FrameKind::Text).await })
        };
        let second = {
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move { dispatcher.handle_frame(&b, "vote==1", FrameKind::Text).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_millis(390));
    }
}
