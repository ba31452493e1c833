//! Authenticated session record

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One authenticated identity bound to an opaque bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub identity: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(token: String, identity: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            token,
            identity,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Slide the expiry window to `now + ttl`, never moving it backwards
    pub fn renew_at(&mut self, now: DateTime<Utc>, ttl: Duration) {
        let candidate = now + ttl;
        if candidate > self.expires_at {
            self.expires_at = candidate;
        }
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}
