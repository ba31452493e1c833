//! Live connection identity and lifecycle

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConnectionError;
use crate::room::RoomId;

/// Unique identifier for a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who is on the other end of a connection and which room it is bound to
///
/// The room is fixed for the lifetime of the connection. An empty identity
/// marks an anonymous participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub id: ConnectionId,
    pub room: RoomId,
    pub identity: String,
}

impl ConnectionContext {
    pub fn new(room: RoomId, identity: impl Into<String>) -> Self {
        Self {
            id: ConnectionId::new(),
            room,
            identity: identity.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.identity.is_empty()
    }
}

/// Lifecycle of a connection: Connecting -> Open -> Closing -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Open) | (Connecting, Closing) | (Open, Closing) | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

/// Tracks the state of one connection and rejects illegal transitions
#[derive(Debug)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
}

impl ConnectionLifecycle {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connecting,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, failing if the transition is not part of the lifecycle
    pub fn transition(&mut self, next: ConnectionState) -> Result<(), ConnectionError> {
        if !self.state.can_transition_to(next) {
            return Err(ConnectionError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// Connecting -> Open
    pub fn open(&mut self) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::Open)
    }

    /// Begin closing; a no-op when already closing or closed
    pub fn begin_close(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            self.state = ConnectionState::Closing;
        }
    }

    /// Closing -> Closed, called once registry removal has completed
    pub fn finish_close(&mut self) -> Result<(), ConnectionError> {
        self.transition(ConnectionState::Closed)
    }
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
