//! RoomStore trait and related types
//!
//! The store is the single authority for room and task state. The engine
//! treats it as an opaque mutation service: each mutation yields one string
//! that is relayed verbatim to the room, or an error that is never relayed.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::connection::ConnectionContext;
use crate::error::StoreError;
use crate::protocol::Action;
use crate::room::RoomId;

/// Relationship between an identity and a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomRole {
    /// Created the room and owns its task list
    Creator,
    Participant,
}

impl fmt::Display for RoomRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomRole::Creator => f.write_str("creator"),
            RoomRole::Participant => f.write_str("participant"),
        }
    }
}

/// External store consumed by the collaboration engine
///
/// Implementations must apply mutations for a given room one at a time.
#[async_trait]
pub trait RoomStore: Send + Sync {
    /// Apply `action` to `room` on behalf of `identity`, returning the
    /// payload to broadcast to the room
    async fn execute_mutation(
        &self,
        action: Action,
        value: &str,
        room: &RoomId,
        identity: &str,
    ) -> Result<String, StoreError>;

    async fn room_exists(&self, room: &RoomId) -> Result<bool, StoreError>;

    /// Create a room owned by `creator` with an initial task list
    async fn create_room(
        &self,
        name: &str,
        tasks: &[String],
        creator: &str,
    ) -> Result<RoomId, StoreError>;

    async fn room_role(&self, room: &RoomId, identity: &str) -> Result<RoomRole, StoreError>;

    /// Check a login/password pair
    async fn verify_credentials(&self, login: &str, password: &str) -> Result<bool, StoreError>;

    /// Note that a connection joined its room
    async fn record_connection(&self, connection: &ConnectionContext) -> Result<(), StoreError>;
}
