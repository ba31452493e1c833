//! Session management for authenticated participants

mod state;
mod store;

pub use state::Session;
pub use store::{DEFAULT_SESSION_TTL_MINUTES, SessionStore};
