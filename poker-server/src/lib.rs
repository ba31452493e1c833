//! poker-server - HTTP and WebSocket server for planning poker rooms
//!
//! This crate owns the session table, the connection registry and the
//! dispatcher, and exposes them through an axum router: the login and room
//! endpoints behind the session gate, plus the `/echo` room channel.

mod error;
pub mod http;
pub mod middleware;
mod state;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use poker_core::{
    DEFAULT_OUTBOUND_BUFFER, DEFAULT_SESSION_TTL_MINUTES, DEFAULT_WRITE_TIMEOUT, RoomStore,
};
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use error::ServerError;
pub use http::create_router;
pub use middleware::{AuthGate, auth_gate};
pub use state::AppState;

/// The main poker server
pub struct PokerServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl PokerServer {
    /// Create a server around the given room store
    pub fn new(config: ServerConfig, store: Arc<dyn RoomStore>) -> Self {
        let state = Arc::new(AppState::new(config.clone(), store));
        Self { config, state }
    }

    /// Create a server with custom state (for testing)
    pub fn with_state(config: ServerConfig, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Get the server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get the shared application state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// Run the server, binding to the configured address
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        self.run_with_listener(listener).await
    }

    /// Serve on an already bound listener until the shutdown token fires
    ///
    /// On shutdown every live connection is closed and all connection tasks
    /// are given `shutdown_grace` to finish before the server returns.
    pub async fn run_with_listener(self, listener: TcpListener) -> Result<(), ServerError> {
        let local = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        info!("poker server listening on {}", local);

        self.start_session_sweeper();

        let shutdown = self.state.shutdown.clone();
        let serve_token = shutdown.clone();
        let router = create_router(Arc::clone(&self.state));
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { serve_token.cancelled().await })
            .await
        });

        let mut early_exit = None;
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested");
            }
            result = &mut server => {
                warn!("HTTP server stopped unexpectedly");
                early_exit = Some(result);
                shutdown.cancel();
            }
        }

        let deadline = Instant::now() + self.config.shutdown_grace;
        let closed = self.state.registry.close_all().await;
        debug!(connections = closed, "Closed live connections");

        self.state.tasks.close();
        if tokio::time::timeout_at(deadline, self.state.tasks.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.state.tasks.len(),
                "Connection tasks still running after shutdown grace period"
            );
        }

        let result = match early_exit {
            Some(result) => result,
            None => match tokio::time::timeout_at(deadline, &mut server).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("HTTP server did not stop within the grace period");
                    server.abort();
                    return Ok(());
                }
            },
        };

        match result {
            Ok(Ok(())) => {
                info!("poker server stopped");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Internal(e.to_string())),
            Err(e) => Err(ServerError::Internal(format!("server task failed: {}", e))),
        }
    }

    /// Start a background task that purges expired sessions
    fn start_session_sweeper(&self) {
        let state = Arc::clone(&self.state);
        let period = self.config.session_sweep_interval.max(Duration::from_secs(1));

        self.state.tasks.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        let purged = state.sessions.purge_expired().await;
                        if purged > 0 {
                            debug!(purged, "Purged expired sessions");
                        }
                    }
                }
            }
        });
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL returned to clients
    pub external_host: String,
    /// Path appended to `external_host` in front of a new room's id
    pub room_path: String,
    /// WebSocket endpoint handed to room participants
    pub websocket_url: String,
    /// Referer that marks a login as coming from the standalone form
    pub login_form_url: String,
    /// Where socket upgrades without a session are redirected
    pub login_path: String,
    /// Session lifetime, renewed on every authenticated request
    pub session_ttl_minutes: i64,
    /// How often expired sessions are purged
    pub session_sweep_interval: Duration,
    /// Name of the session cookie
    pub cookie_name: String,
    /// Mark the session cookie `Secure`
    pub secure_cookie: bool,
    /// Accept room connections without a session
    pub allow_anonymous: bool,
    /// Bound on a single outbound delivery
    pub write_timeout: Duration,
    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
    /// Close connections that send malformed frames
    pub drop_on_malformed_frame: bool,
    /// How long shutdown waits for connection tasks
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            external_host: "http://localhost:8080".to_string(),
            room_path: "/room?roomId=".to_string(),
            websocket_url: "ws://localhost:8080/echo".to_string(),
            login_form_url: "http://localhost:8080/loginform".to_string(),
            login_path: "/loginform".to_string(),
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            session_sweep_interval: Duration::from_secs(60),
            cookie_name: "sessionId".to_string(),
            secure_cookie: false,
            allow_anonymous: false,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            drop_on_malformed_frame: true,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Create a new ServerConfig with the specified host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Returns the socket address string (e.g., "127.0.0.1:8080")
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poker_core::MemoryRoomStore;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8080);
        assert_eq!(config.cookie_name, "sessionId");
        assert!(!config.allow_anonymous);
        assert!(config.drop_on_malformed_frame);
    }

    #[test]
    fn test_server_config_addr() {
        let config = ServerConfig::new("0.0.0.0", 9000);
        assert_eq!(config.addr(), "0.0.0.0:9000");
    }

    #[test]
    fn test_server_config_session_ttl() {
        let config = ServerConfig::default();
        assert_eq!(config.session_ttl(), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_poker_server_with_state() {
        let config = ServerConfig::new("127.0.0.1", 9000);
        let state = Arc::new(AppState::in_memory(config.clone()));
        let server = PokerServer::with_state(config, Arc::clone(&state));
        assert_eq!(server.config().port, 9000);
        assert!(Arc::ptr_eq(&server.state(), &state));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_token() {
        let server = PokerServer::new(
            ServerConfig::new("127.0.0.1", 0),
            Arc::new(MemoryRoomStore::new()),
        );
        let token = server.shutdown_token();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let handle = tokio::spawn(server.run_with_listener(listener));

        token.cancel();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_run_reports_bind_failure() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let server = PokerServer::new(
            ServerConfig::new("127.0.0.1", port),
            Arc::new(MemoryRoomStore::new()),
        );

        let err = server.run().await.unwrap_err();
        assert!(matches!(err, ServerError::Bind { .. }));
    }
}
