//! Scriptable RoomStore for tests
//!
//! Queue results with `queue_response()` / `queue_error()`; each mutation
//! consumes one. With an empty queue a mutation echoes `<command>==<value>`.
//! Every mutation is recorded for later assertions.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::traits::{RoomRole, RoomStore};
use crate::connection::ConnectionContext;
use crate::error::StoreError;
use crate::protocol::Action;
use crate::room::RoomId;

/// A mutation as received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationCall {
    pub action: Action,
    pub value: String,
    pub room: RoomId,
    pub identity: String,
}

/// RoomStore that replays scripted results
#[derive(Default)]
pub struct MockRoomStore {
    responses: Mutex<VecDeque<Result<String, StoreError>>>,
    calls: Mutex<Vec<MutationCall>>,
    connections: Mutex<Vec<ConnectionContext>>,
    delay: Option<Duration>,
}

impl MockRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every mutation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a successful mutation result
    pub fn queue_response(&self, payload: impl Into<String>) {
        self.push(Ok(payload.into()));
    }

    /// Queue a failed mutation
    pub fn queue_error(&self, error: StoreError) {
        self.push(Err(error));
    }

    /// Mutations received so far
    pub fn calls(&self) -> Vec<MutationCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Connections recorded so far
    pub fn connections(&self) -> Vec<ConnectionContext> {
        self.connections
            .lock()
            .map(|connections| connections.clone())
            .unwrap_or_default()
    }

    fn push(&self, result: Result<String, StoreError>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(result);
        }
    }

    fn next_response(&self) -> Option<Result<String, StoreError>> {
        self.responses.lock().ok()?.pop_front()
    }
}

#[async_trait]
impl RoomStore for MockRoomStore {
    async fn execute_mutation(
        &self,
        action: Action,
        value: &str,
        room: &RoomId,
        identity: &str,
    ) -> Result<String, StoreError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(MutationCall {
                action,
                value: value.to_string(),
                room: room.clone(),
                identity: identity.to_string(),
            });
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.next_response()
            .unwrap_or_else(|| Ok(format!("{}=={}", action.command(), value)))
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

    async fn verify_credentials(&self, login: &str, password: &str) -> Result<bool, StoreError> {
        Ok(!login.is_empty() && !password.is_empty())
    }

    async fn record_connection(&self, connection: &ConnectionContext) -> Result<(), StoreError> {
        if let Ok(mut connections) = self.connections.lock() {
            connections.push(connection.clone());
        }
        Ok(())
    }
}
