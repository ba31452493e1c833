use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use tracing::debug;

use super::types::{
    DEFAULT_HOST, DEFAULT_PORT, PokerConfig, RawPokerConfig, RawRoomsSection, RawServerSection,
    RawSessionSection, RawWsSection, RoomsSection, ServerSection, SessionSection, WsSection,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<PokerConfig> {
        let user_path = Self::user_config_path();
        let project_path = Self::project_config_path();
        Self::load_from_paths(user_path.as_deref(), &project_path)
    }

    /// Load and merge the given layers; missing files are skipped
    pub fn load_from_paths(user_path: Option<&Path>, project_path: &Path) -> Result<PokerConfig> {
        let mut raw = RawPokerConfig::default();

        // Layer 1: User config
        if let Some(user_path) = user_path {
            if let Some(user_config) = Self::read_raw(user_path)? {
                raw = Self::merge_raw(raw, user_config);
            }
        }

        // Layer 2: Project config
        if let Some(project_config) = Self::read_raw(project_path)? {
            raw = Self::merge_raw(raw, project_config);
        }

        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<Option<RawPokerConfig>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let raw = toml::from_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(Some(raw))
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "poker").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with POKER_PROJECT_CONFIG_DIR env var
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("POKER_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".poker/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawPokerConfig, overlay: RawPokerConfig) -> RawPokerConfig {
        let mut users = base.users;
        users.extend(overlay.users);

        RawPokerConfig {
            server: RawServerSection {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                external_host: overlay.server.external_host.or(base.server.external_host),
                room_path: overlay.server.room_path.or(base.server.room_path),
                websocket_url: overlay.server.websocket_url.or(base.server.websocket_url),
                login_form_url: overlay.server.login_form_url.or(base.server.login_form_url),
                shutdown_grace_secs: overlay
                    .server
                    .shutdown_grace_secs
                    .or(base.server.shutdown_grace_secs),
            },
            session: RawSessionSection {
                ttl_minutes: overlay.session.ttl_minutes.or(base.session.ttl_minutes),
                cookie_name: overlay.session.cookie_name.or(base.session.cookie_name),
                secure_cookie: overlay.session.secure_cookie.or(base.session.secure_cookie),
                sweep_interval_secs: overlay
                    .session
                    .sweep_interval_secs
                    .or(base.session.sweep_interval_secs),
            },
            rooms: RawRoomsSection {
                allow_anonymous: overlay.rooms.allow_anonymous.or(base.rooms.allow_anonymous),
            },
            ws: RawWsSection {
                write_timeout_ms: overlay.ws.write_timeout_ms.or(base.ws.write_timeout_ms),
                outbound_buffer: overlay.ws.outbound_buffer.or(base.ws.outbound_buffer),
                drop_on_malformed_frame: overlay
                    .ws
                    .drop_on_malformed_frame
                    .or(base.ws.drop_on_malformed_frame),
            },
            users,
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawPokerConfig) -> PokerConfig {
        let server = ServerSection::default();
        let session = SessionSection::default();
        let ws = WsSection::default();

        PokerConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                external_host: raw.server.external_host.unwrap_or(server.external_host),
                room_path: raw.server.room_path.unwrap_or(server.room_path),
                websocket_url: raw.server.websocket_url.unwrap_or(server.websocket_url),
                login_form_url: raw.server.login_form_url.unwrap_or(server.login_form_url),
                shutdown_grace_secs: raw
                    .server
                    .shutdown_grace_secs
                    .unwrap_or(server.shutdown_grace_secs),
            },
            session: SessionSection {
                ttl_minutes: raw.session.ttl_minutes.unwrap_or(session.ttl_minutes),
                cookie_name: raw.session.cookie_name.unwrap_or(session.cookie_name),
                secure_cookie: raw.session.secure_cookie.unwrap_or(session.secure_cookie),
                sweep_interval_secs: raw
                    .session
                    .sweep_interval_secs
                    .unwrap_or(session.sweep_interval_secs),
            },
            rooms: RoomsSection {
                allow_anonymous: raw.rooms.allow_anonymous.unwrap_or(false),
            },
            ws: WsSection {
                write_timeout_ms: raw.ws.write_timeout_ms.unwrap_or(ws.write_timeout_ms),
                outbound_buffer: raw.ws.outbound_buffer.unwrap_or(ws.outbound_buffer),
                drop_on_malformed_frame: raw
                    .ws
                    .drop_on_malformed_frame
                    .unwrap_or(ws.drop_on_malformed_frame),
            },
            users: raw.users,
        }
    }
}
