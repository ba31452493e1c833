//! Wire protocol for room channels
//!
//! Frames in both directions are UTF-8 text of the form `<command>` or
//! `<command>==<value>`. There is no escaping; a frame that splits into more
//! than two fields is malformed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Separator between a command name and its value
pub const DELIMITER: &str = "==";

/// A parsed client frame: command name plus optional value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCommand {
    pub name: String,
    /// `None` for a bare command, `Some("")` for `<command>==`
    pub value: Option<String>,
}

impl ChangeCommand {
    /// Create a bare command without a value
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Create a command carrying a value
    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Parse one wire frame
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let mut fields = frame.split(DELIMITER);
        // split always yields at least one field
        let name = fields.next().unwrap_or_default();
        let value = fields.next();

        let extra = fields.count();
        if extra > 0 {
            return Err(ProtocolError::TooManyFields { fields: 2 + extra });
        }

        Ok(Self {
            name: name.to_string(),
            value: value.map(str::to_string),
        })
    }

    /// Parse a binary frame, which must carry UTF-8 text
    pub fn parse_bytes(frame: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidUtf8)?;
        Self::parse(text)
    }

    /// Render back into wire form
    pub fn encode(&self) -> String {
        match &self.value {
            Some(value) => format!("{}{}{}", self.name, DELIMITER, value),
            None => self.name.clone(),
        }
    }

    /// The value as submitted to the store; a bare command submits ""
    pub fn value_or_empty(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }

    /// Resolve the command name to a supported action
    pub fn action(&self) -> Option<Action> {
        Action::resolve(&self.name)
    }
}

impl fmt::Display for ChangeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Closed set of room mutations a client may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// Record the sender's estimate for the current task
    CastVote,
    /// Make the current task's votes visible to everyone
    RevealVotes,
    /// Clear votes on the current task and hide them again
    ResetRound,
    /// Delete a task (by index, or the current one when no index is given)
    RemoveTask,
    /// Move the room to the next task
    AdvanceTask,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::CastVote,
        Action::RevealVotes,
        Action::ResetRound,
        Action::RemoveTask,
        Action::AdvanceTask,
    ];

    /// Map a wire command name to an action
    pub fn resolve(command: &str) -> Option<Self> {
        match command {
            "vote" => Some(Action::CastVote),
            "reveal" => Some(Action::RevealVotes),
            "reset" => Some(Action::ResetRound),
            "remove-task" => Some(Action::RemoveTask),
            "next-task" => Some(Action::AdvanceTask),
            _ => None,
        }
    }

    /// Wire command name for this action
    pub fn command(&self) -> &'static str {
        match self {
            Action::CastVote => "vote",
            Action::RevealVotes => "reveal",
            Action::ResetRound => "reset",
            Action::RemoveTask => "remove-task",
            Action::AdvanceTask => "next-task",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// Frame type used when relaying a broadcast
///
/// Replies mirror the kind of the frame that triggered them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    #[default]
    Text,
    Binary,
}
