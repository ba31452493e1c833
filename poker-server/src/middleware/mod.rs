//! HTTP middleware

mod auth;

pub use auth::{AuthGate, CookieSettings, Identity, auth_gate, extract_cookie};
