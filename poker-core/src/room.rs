//! Room identifiers
//!
//! Rooms are addressed by the canonical 36-character hyphenated GUID text
//! form everywhere: query parameters, registry keys and store calls.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RoomIdError;

/// Length of the canonical hyphenated GUID text form
pub const ROOM_ID_LEN: usize = 36;

/// Validated room identifier, stored lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Parse a room id, accepting only the 36-character hyphenated form
    pub fn parse(raw: &str) -> Result<Self, RoomIdError> {
        if raw.len() != ROOM_ID_LEN {
            return Err(RoomIdError::InvalidLength {
                expected: ROOM_ID_LEN,
                actual: raw.len(),
            });
        }

        let uuid = Uuid::try_parse(raw).map_err(|_| RoomIdError::InvalidFormat(raw.to_string()))?;
        Ok(Self::from_uuid(uuid))
    }

    /// Generate a fresh random room id
    pub fn generate() -> Self {
        Self::from_uuid(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid.hyphenated().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomId {
    type Err = RoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
