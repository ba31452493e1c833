//! Error types for poker-core

use thiserror::Error;

use crate::connection::ConnectionState;

/// Top-level error type for poker-core
#[derive(Error, Debug)]
pub enum PokerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Room id error: {0}")]
    RoomId(#[from] RoomIdError),
}

/// Malformed wire frames
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame has {fields} fields, at most 2 are allowed")]
    TooManyFields { fields: usize },

    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Failures reported by the external room store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid value for {action}: {value}")]
    InvalidValue { action: String, value: String },

    #[error("Mutation rejected: {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failures on a single live connection
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Write timed out after {0}ms")]
    WriteTimeout(u64),

    #[error("Connection closed")]
    Closed,
}

/// Room identifiers that are not canonical GUIDs
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoomIdError {
    #[error("room id must be {expected} characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("room id is not a hyphenated GUID: {0}")]
    InvalidFormat(String),
}

/// Result alias for poker-core operations
pub type PokerResult<T> = Result<T, PokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_too_many_fields_displays_count() {
        let error = ProtocolError::TooManyFields { fields: 3 };
        assert_eq!(error.to_string(), "frame has 3 fields, at most 2 are allowed");
    }

    #[test]
    fn store_error_room_not_found_displays_room() {
        let error = StoreError::RoomNotFound("abc".to_string());
        assert!(error.to_string().contains("Room not found"));
        assert!(error.to_string().contains("abc"));
    }

    #[test]
    fn connection_error_invalid_transition_displays_states() {
        let error = ConnectionError::InvalidTransition {
            from: ConnectionState::Closed,
            to: ConnectionState::Open,
        };
        assert!(error.to_string().contains("Closed"));
        assert!(error.to_string().contains("Open"));
    }

    #[test]
    fn poker_error_converts_from_protocol_error() {
        let error: PokerError = ProtocolError::InvalidUtf8.into();
        assert!(matches!(error, PokerError::Protocol(_)));
        assert!(error.to_string().contains("Protocol error"));
    }

    #[test]
    fn poker_error_converts_from_store_error() {
        let error: PokerError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(error, PokerError::Store(_)));
    }

    #[test]
    fn poker_error_converts_from_room_id_error() {
        let error: PokerError = RoomIdError::InvalidLength {
            expected: 36,
            actual: 4,
        }
        .into();
        assert!(error.to_string().contains("36"));
    }
}
