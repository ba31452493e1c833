//! SessionStore: process-wide table of authenticated identities
//!
//! Every gated request reads and renews a session, so the table sits behind a
//! single RwLock. Renewal takes the write lock, which serializes concurrent
//! renewals of the same token (duplicate tabs) without losing an update.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::state::Session;

/// Default sliding expiry window
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Thread-safe session table with sliding expiry
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl SessionStore {
    /// Create a store whose sessions expire `ttl` after their last renewal
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// The sliding expiry window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Create a session for `identity` and return it (token included)
    pub async fn create_session(&self, identity: impl Into<String>) -> Session {
        self.create_session_at(identity, Utc::now()).await
    }

    #[instrument(name = "session::create", skip_all)]
    pub async fn create_session_at(
        &self,
        identity: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Session {
        let identity = identity.into();
        let mut sessions = self.sessions.write().await;

        let mut token = new_token();
        while sessions.contains_key(&token) {
            token = new_token();
        }

        let session = Session::new(token.clone(), identity, now, self.ttl);
        sessions.insert(token, session.clone());
        debug!(identity = %session.identity, "Session created");
        session
    }

    /// Validate `token` and slide its expiry forward
    ///
    /// Returns the renewed session, or `None` when the token is unknown or
    /// expired. Expired entries are removed on the way out.
    pub async fn check_and_renew(&self, token: &str) -> Option<Session> {
        self.check_and_renew_at(token, Utc::now()).await
    }

    #[instrument(name = "session::check_and_renew", skip_all)]
    pub async fn check_and_renew_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(token)?;

        if session.is_expired_at(now) {
            debug!(identity = %session.identity, "Session expired");
            sessions.remove(token);
            return None;
        }

        session.renew_at(now, self.ttl);
        Some(session.clone())
    }

    /// Look up the identity behind `token` without renewing it
    pub async fn identity(&self, token: &str) -> Option<String> {
        self.identity_at(token, Utc::now()).await
    }

    pub async fn identity_at(&self, token: &str, now: DateTime<Utc>) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(token)
            .filter(|session| !session.is_expired_at(now))
            .map(|session| session.identity.clone())
    }

    /// Remove a session; returns whether it existed
    pub async fn invalidate(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Drop every expired session, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now()).await
    }

    pub async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }

    /// Number of sessions currently held (expired ones included until purged)
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_SESSION_TTL_MINUTES))
    }
}

fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}
