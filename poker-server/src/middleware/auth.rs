//! Session gate middleware for axum
//!
//! Protected routes only run when the request carries a live session cookie.
//! The session is renewed on every pass and the cookie re-issued; anything
//! else gets the login view and the handler is never invoked.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use poker_core::{Session, SessionStore};
use tracing::debug;

use crate::ServerConfig;
use crate::error::ServerError;
use crate::http::pages;

/// Identity of the authenticated caller, attached to gated requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(pub String);

/// Cookie attributes for the session token
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub name: String,
    pub secure: bool,
}

impl CookieSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            name: config.cookie_name.clone(),
            secure: config.secure_cookie,
        }
    }

    /// Build the `Set-Cookie` value carrying `session`
    pub fn header_value(&self, session: &Session) -> Result<HeaderValue, ServerError> {
        let max_age = (session.expires_at - chrono::Utc::now())
            .num_seconds()
            .max(0);
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            self.name, session.token, max_age
        );
        if self.secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie).map_err(|e| ServerError::Cookie(e.to_string()))
    }

    /// Read this cookie's token from request headers
    pub fn token(&self, headers: &HeaderMap) -> Option<String> {
        extract_cookie(headers, &self.name)
    }
}

/// Session gate state
#[derive(Clone)]
pub struct AuthGate {
    sessions: Arc<SessionStore>,
    cookie: CookieSettings,
}

impl AuthGate {
    pub fn new(sessions: Arc<SessionStore>, cookie: CookieSettings) -> Self {
        Self { sessions, cookie }
    }

    /// Validate and renew the session carried by `headers`
    pub async fn check(&self, headers: &HeaderMap) -> Option<Session> {
        let token = self.cookie.token(headers)?;
        self.sessions.check_and_renew(&token).await
    }

    pub fn cookie(&self) -> &CookieSettings {
        &self.cookie
    }
}

/// Extract a named cookie from the `Cookie` header(s)
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .map(str::trim)
        .find_map(|cookie| cookie.strip_prefix(&prefix))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Session gate middleware function
pub async fn auth_gate(
    axum::Extension(gate): axum::Extension<AuthGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(session) = gate.check(request.headers()).await else {
        debug!(path = %request.uri().path(), "No valid session, serving login view");
        return pages::login_view().into_response();
    };

    let cookie = match gate.cookie.header_value(&session) {
        Ok(cookie) => cookie,
        Err(e) => return e.into_response(),
    };

    request
        .extensions_mut()
        .insert(Identity(session.identity.clone()));

    let mut response = next.run(request).await;
    response.headers_mut().append(header::SET_COOKIE, cookie);
    response
}
