//! WebSocket module for room channels

mod connection;

pub use connection::ws_handler;
