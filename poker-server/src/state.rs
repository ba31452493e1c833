//! Shared application state for the poker server

use std::sync::Arc;

use chrono::{DateTime, Utc};
use poker_core::{ConnectionRegistry, Dispatcher, MemoryRoomStore, RoomStore, SessionStore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::ServerConfig;

/// Shared application state accessible by all handlers
#[derive(Clone)]
pub struct AppState {
    /// Effective server configuration
    pub config: Arc<ServerConfig>,
    /// Authenticated sessions
    pub sessions: Arc<SessionStore>,
    /// Live room connections
    pub registry: Arc<ConnectionRegistry>,
    /// Command dispatch for room channels
    pub dispatcher: Arc<Dispatcher>,
    /// External room store
    pub store: Arc<dyn RoomStore>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
    /// Connection and background tasks joined on shutdown
    pub tasks: TaskTracker,
    /// When the server started
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Create state around the given store
    pub fn new(config: ServerConfig, store: Arc<dyn RoomStore>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl()));
        let registry = Arc::new(ConnectionRegistry::new(config.write_timeout));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&store), Arc::clone(&registry)));

        Self {
            config: Arc::new(config),
            sessions,
            registry,
            dispatcher,
            store,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started_at: Utc::now(),
        }
    }

    /// Create state with an empty in-memory store
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(config, Arc::new(MemoryRoomStore::new()))
    }

    /// Returns how long the server has been running
    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
