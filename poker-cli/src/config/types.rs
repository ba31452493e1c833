use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default host for the poker server
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port for the poker server
pub const DEFAULT_PORT: u16 = 8080;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPokerConfig {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub session: RawSessionSection,

    #[serde(default)]
    pub rooms: RawRoomsSection,

    #[serde(default)]
    pub ws: RawWsSection,

    /// Login to password
    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub external_host: Option<String>,
    pub room_path: Option<String>,
    pub websocket_url: Option<String>,
    pub login_form_url: Option<String>,
    pub shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSessionSection {
    pub ttl_minutes: Option<i64>,
    pub cookie_name: Option<String>,
    pub secure_cookie: Option<bool>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawRoomsSection {
    pub allow_anonymous: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawWsSection {
    pub write_timeout_ms: Option<u64>,
    pub outbound_buffer: Option<usize>,
    pub drop_on_malformed_frame: Option<bool>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PokerConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub rooms: RoomsSection,

    #[serde(default)]
    pub ws: WsSection,

    #[serde(default)]
    pub users: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL handed back to clients
    pub external_host: String,

    /// Appended to `external_host` in front of a new room's id
    pub room_path: String,

    /// WebSocket endpoint handed to room participants
    pub websocket_url: String,

    /// Referer of the standalone login form
    pub login_form_url: String,

    /// Seconds shutdown waits for open connections
    pub shutdown_grace_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        let defaults = poker_server::ServerConfig::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            external_host: defaults.external_host,
            room_path: defaults.room_path,
            websocket_url: defaults.websocket_url,
            login_form_url: defaults.login_form_url,
            shutdown_grace_secs: defaults.shutdown_grace.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    /// Idle lifetime of a session
    pub ttl_minutes: i64,

    pub cookie_name: String,

    pub secure_cookie: bool,

    /// Seconds between sweeps of expired sessions
    pub sweep_interval_secs: u64,
}

impl Default for SessionSection {
    fn default() -> Self {
        let defaults = poker_server::ServerConfig::default();
        Self {
            ttl_minutes: defaults.session_ttl_minutes,
            cookie_name: defaults.cookie_name,
            secure_cookie: defaults.secure_cookie,
            sweep_interval_secs: defaults.session_sweep_interval.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoomsSection {
    /// Let room sockets connect without a session
    pub allow_anonymous: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsSection {
    /// Bound on a single outbound delivery
    pub write_timeout_ms: u64,

    /// Frames queued per connection before deliveries start timing out
    pub outbound_buffer: usize,

    /// Close a connection that sends a malformed frame
    pub drop_on_malformed_frame: bool,
}

impl Default for WsSection {
    fn default() -> Self {
        let defaults = poker_server::ServerConfig::default();
        Self {
            write_timeout_ms: defaults.write_timeout.as_millis() as u64,
            outbound_buffer: defaults.outbound_buffer,
            drop_on_malformed_frame: defaults.drop_on_malformed_frame,
        }
    }
}

impl PokerConfig {
    /// Reject values the server cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.session.ttl_minutes <= 0 {
            anyhow::bail!("session.ttl_minutes must be positive");
        }
        if self.session.cookie_name.trim().is_empty() {
            anyhow::bail!("session.cookie_name must not be empty");
        }
        if self.ws.write_timeout_ms == 0 {
            anyhow::bail!("ws.write_timeout_ms must be positive");
        }
        if self.ws.outbound_buffer == 0 {
            anyhow::bail!("ws.outbound_buffer must be positive");
        }
        Ok(())
    }

    /// Settings for the server crate
    pub fn to_server_config(&self) -> poker_server::ServerConfig {
        poker_server::ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            external_host: self.server.external_host.clone(),
            room_path: self.server.room_path.clone(),
            websocket_url: self.server.websocket_url.clone(),
            login_form_url: self.server.login_form_url.clone(),
            session_ttl_minutes: self.session.ttl_minutes,
            session_sweep_interval: Duration::from_secs(self.session.sweep_interval_secs),
            cookie_name: self.session.cookie_name.clone(),
            secure_cookie: self.session.secure_cookie,
            allow_anonymous: self.rooms.allow_anonymous,
            write_timeout: Duration::from_millis(self.ws.write_timeout_ms),
            outbound_buffer: self.ws.outbound_buffer,
            drop_on_malformed_frame: self.ws.drop_on_malformed_frame,
            shutdown_grace: Duration::from_secs(self.server.shutdown_grace_secs),
            ..poker_server::ServerConfig::default()
        }
    }

    /// Copy with every password masked, for display
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for password in config.users.values_mut() {
            *password = "********".to_string();
        }
        config
    }
}
