//! Shared test utilities for poker-server integration tests

pub mod client;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use poker_core::{MockRoomStore, RoomId, RoomStore};
use poker_server::{AppState, PokerServer, ServerConfig};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running server plus what tests need to drive it
#[allow(dead_code)]
pub struct TestServer {
    pub state: Arc<AppState>,
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<(), poker_server::ServerError>>,
}

/// Creates a test server backed by a mock store
#[allow(dead_code)]
pub async fn create_test_server() -> (Arc<AppState>, SocketAddr, Arc<MockRoomStore>) {
    let store = Arc::new(MockRoomStore::new());
    let server = create_test_server_with(ServerConfig::default(), store.clone()).await;
    (server.state, server.addr, store)
}

/// Creates a test server with a custom config and store
#[allow(dead_code)]
pub async fn create_test_server_with(config: ServerConfig, store: Arc<dyn RoomStore>) -> TestServer {
    let state = Arc::new(AppState::new(config.clone(), store));
    let server = PokerServer::with_state(config, Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(server.run_with_listener(listener));

    // Brief delay to ensure server is accepting connections
    tokio::time::sleep(Duration::from_millis(10)).await;

    TestServer {
        state,
        addr,
        handle,
    }
}

/// Cookie header value for a fresh session of `identity`
#[allow(dead_code)]
pub async fn session_cookie(state: &AppState, identity: &str) -> String {
    let session = state.sessions.create_session(identity).await;
    format!("{}={}", state.config.cookie_name, session.token)
}

/// Wait until `room` has exactly `expected` registered connections
#[allow(dead_code)]
pub async fn wait_for_connections(state: &AppState, room: &RoomId, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let count = state.registry.room_connection_count(room).await;
        if count == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "room {} has {} connections, expected {}",
            room,
            count,
            expected
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
