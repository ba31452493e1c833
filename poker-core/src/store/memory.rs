//! In-memory RoomStore
//!
//! Keeps rooms, tasks and votes in process memory behind one async mutex, so
//! mutations are applied strictly one at a time. Every successful mutation
//! returns the room snapshot as JSON; estimates stay hidden until revealed.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::traits::{RoomRole, RoomStore};
use crate::connection::ConnectionContext;
use crate::error::StoreError;
use crate::protocol::Action;
use crate::room::RoomId;

#[derive(Debug, Clone)]
struct TaskRecord {
    title: String,
    /// identity -> estimate
    votes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct RoomRecord {
    name: String,
    creator: String,
    tasks: Vec<TaskRecord>,
    current: usize,
    revealed: bool,
    participants: BTreeSet<String>,
}

impl RoomRecord {
    fn current_task_mut(&mut self) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(self.current)
    }

    fn snapshot(&self, id: &RoomId) -> RoomSnapshot {
        let task = self.tasks.get(self.current);
        let votes = task
            .map(|task| {
                task.votes
                    .iter()
                    .map(|(participant, estimate)| VoteView {
                        participant: participant.clone(),
                        estimate: self.revealed.then(|| estimate.clone()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        RoomSnapshot {
            room_id: id.clone(),
            name: self.name.clone(),
            current_task: task.map(|_| self.current),
            task: task.map(|task| task.title.clone()),
            task_count: self.tasks.len(),
            revealed: self.revealed,
            votes,
        }
    }
}

/// One participant's vote as broadcast to the room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteView {
    pub participant: String,
    /// `None` until the round is revealed
    pub estimate: Option<String>,
}

/// Room state returned after every successful mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub name: String,
    /// Index of the task being estimated, `None` once every task is done
    pub current_task: Option<usize>,
    pub task: Option<String>,
    pub task_count: usize,
    pub revealed: bool,
    pub votes: Vec<VoteView>,
}

/// Room store held entirely in memory
#[derive(Default)]
pub struct MemoryRoomStore {
    rooms: Mutex<HashMap<RoomId, RoomRecord>>,
    users: HashMap<String, String>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a login/password pair accepted by `verify_credentials`
    pub fn with_user(mut self, login: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(login.into(), password.into());
        self
    }

    /// Add every login/password pair from `users`
    pub fn with_users<I, K, V>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.users
            .extend(users.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Current snapshot of a room
    pub async fn snapshot(&self, room: &RoomId) -> Result<RoomSnapshot, StoreError> {
        let rooms = self.rooms.lock().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.to_string()))?;
        Ok(record.snapshot(room))
    }

    /// Identities that have joined a room
    pub async fn participants(&self, room: &RoomId) -> Vec<String> {
        let rooms = self.rooms.lock().await;
        rooms
            .get(room)
            .map(|record| record.participants.iter().cloned().collect())
            .unwrap_or_default()
    }
}

fn require_creator(record: &RoomRecord, action: Action, identity: &str) -> Result<(), StoreError> {
    if record.creator == identity {
        Ok(())
    } else {
        Err(StoreError::Rejected(format!(
            "only the room creator may {}",
            action
        )))
    }
}

fn apply(
    record: &mut RoomRecord,
    action: Action,
    value: &str,
    identity: &str,
) -> Result<(), StoreError> {
    match action {
        Action::CastVote => {
            if identity.is_empty() {
                return Err(StoreError::Rejected(
                    "anonymous participants cannot vote".to_string(),
                ));
            }
            if value.is_empty() {
                return Err(StoreError::InvalidValue {
                    action: action.to_string(),
                    value: value.to_string(),
                });
            }
            if record.revealed {
                return Err(StoreError::Rejected("votes are already revealed".to_string()));
            }
            let current = record.current;
            let task = record
                .current_task_mut()
                .ok_or_else(|| StoreError::TaskNotFound(current.to_string()))?;
            task.votes.insert(identity.to_string(), value.to_string());
        }
        Action::RevealVotes => {
            require_creator(record, action, identity)?;
            record.revealed = true;
        }
        Action::ResetRound => {
            require_creator(record, action, identity)?;
            if let Some(task) = record.current_task_mut() {
                task.votes.clear();
            }
            record.revealed = false;
        }
        Action::RemoveTask => {
            require_creator(record, action, identity)?;
            let index = if value.is_empty() {
                record.current
            } else {
                value.parse::<usize>().map_err(|_| StoreError::InvalidValue {
                    action: action.to_string(),
                    value: value.to_string(),
                })?
            };
            if index >= record.tasks.len() {
                return Err(StoreError::TaskNotFound(index.to_string()));
            }
            record.tasks.remove(index);
            if index < record.current {
                record.current -= 1;
            } else if index == record.current {
                record.revealed = false;
            }
        }
        Action::AdvanceTask => {
            require_creator(record, action, identity)?;
            if record.current >= record.tasks.len() {
                return Err(StoreError::TaskNotFound(record.current.to_string()));
            }
            record.current += 1;
            record.revealed = false;
        }
    }
    Ok(())
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn execute_mutation(
        &self,
        action: Action,
        value: &str,
        room: &RoomId,
        identity: &str,
    ) -> Result<String, StoreError> {
        let mut rooms = self.rooms.lock().await;
        let record = rooms
            .get_mut(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.to_string()))?;

        // Apply to a copy so a rejected mutation leaves no partial change
        let mut updated = record.clone();
        apply(&mut updated, action, value, identity)?;
        *record = updated;

        debug!(room = %room, %action, "Mutation applied");
        serde_json::to_string(&record.snapshot(room))
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn room_exists(&self, room: &RoomId) -> Result<bool, StoreError> {
        Ok(self.rooms.lock().await.contains_key(room))
    }

    async fn create_room(
        &self,
        name: &str,
        tasks: &[String],
        creator: &str,
    ) -> Result<RoomId, StoreError> {
        let id = RoomId::generate();
        let record = RoomRecord {
            name: name.to_string(),
            creator: creator.to_string(),
            tasks: tasks
                .iter()
                .map(|title| TaskRecord {
                    title: title.clone(),
                    votes: BTreeMap::new(),
                })
                .collect(),
            current: 0,
            revealed: false,
            participants: BTreeSet::new(),
        };
        self.rooms.lock().await.insert(id.clone(), record);
        debug!(room = %id, "Room created");
        Ok(id)
    }

    async fn room_role(&self, room: &RoomId, identity: &str) -> Result<RoomRole, StoreError> {
        let rooms = self.rooms.lock().await;
        let record = rooms
            .get(room)
            .ok_or_else(|| StoreError::RoomNotFound(room.to_string()))?;
        if !identity.is_empty() && record.creator == identity {
            Ok(RoomRole::Creator)
        } else {
            Ok(RoomRole::Participant)
        }
    }

    async fn verify_credentials(&self, login: &str, password: &str) -> Result<bool, StoreError> {
        Ok(self
            .users
            .get(login)
            .is_some_and(|expected| expected == password))
    }

    async fn record_connection(&self, connection: &ConnectionContext) -> Result<(), StoreError> {
        let mut rooms = self.rooms.lock().await;
        let record = rooms
            .get_mut(&connection.room)
            .ok_or_else(|| StoreError::RoomNotFound(connection.room.to_string()))?;
        if !connection.is_anonymous() {
            record.participants.insert(connection.identity.clone());
        }
        Ok(())
    }
}
