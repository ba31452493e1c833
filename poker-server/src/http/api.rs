//! HTTP API handlers

use std::sync::Arc;

use axum::{
    Extension, Form, Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use poker_core::{RoomId, RoomRole, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::error::ServerError;
use crate::middleware::{CookieSettings, Identity};

/// Body returned by `/login` when the credentials are rejected
pub const LOGIN_REJECTED: &str = "Wrong";

/// Query carrying a room id
#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
    pub connections: usize,
    pub rooms: usize,
}

/// Health check endpoint
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        connections: state.registry.connection_count().await,
        rooms: state.registry.rooms().await.len(),
    })
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(rename = "loginUser", default)]
    pub login: String,
    #[serde(default)]
    pub password: String,
}

/// Check credentials and issue a session cookie
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, ServerError> {
    if form.login.is_empty() || form.password.is_empty() {
        return Ok(LOGIN_REJECTED.into_response());
    }

    if !state
        .store
        .verify_credentials(&form.login, &form.password)
        .await?
    {
        info!(login = %form.login, "Login rejected");
        return Ok(LOGIN_REJECTED.into_response());
    }

    let session = state.sessions.create_session(&form.login).await;
    let cookie = CookieSettings::from_config(&state.config).header_value(&session)?;
    info!(login = %form.login, "Login succeeded");

    // Logins from the standalone form are sent back to the landing page
    let from_login_form = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|referer| referer == state.config.login_form_url);
    let body = if from_login_form {
        state.config.external_host.clone()
    } else {
        String::new()
    };

    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// Result of a room lookup
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomLookup {
    pub room_id: RoomId,
    pub exists: bool,
    pub host: String,
}

/// Check whether a room exists
pub async fn find_room(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RoomQuery>,
) -> Result<Json<RoomLookup>, ServerError> {
    let room_id = RoomId::parse(&query.room_id)?;
    let exists = state.store.room_exists(&room_id).await?;
    Ok(Json(RoomLookup {
        room_id,
        exists,
        host: state.config.external_host.clone(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct CreateRoomForm {
    #[serde(rename = "nameRoom", default)]
    pub name: String,
    /// One task title per line
    #[serde(default)]
    pub tasks: String,
}

impl CreateRoomForm {
    fn task_titles(&self) -> Vec<String> {
        self.tasks
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Create a room owned by the caller; responds with the room's URL
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    Extension(Identity(creator)): Extension<Identity>,
    Form(form): Form<CreateRoomForm>,
) -> Result<Response, ServerError> {
    let tasks = form.task_titles();
    if form.name.trim().is_empty() && tasks.is_empty() {
        return Ok(Redirect::to("/bad-request").into_response());
    }

    let room_id = state
        .store
        .create_room(form.name.trim(), &tasks, &creator)
        .await?;
    info!(room = %room_id, creator = %creator, tasks = tasks.len(), "Room created");

    let url = format!(
        "{}{}{}",
        state.config.external_host, state.config.room_path, room_id
    );
    Ok((StatusCode::CREATED, url).into_response())
}

/// What a caller needs to join a room
#[derive(Debug, Serialize, Deserialize)]
pub struct RoomEntry {
    pub room_id: RoomId,
    pub role: RoomRole,
    pub websocket_url: String,
}

/// Describe the caller's role in a room and where to connect
pub async fn enter_room(
    State(state): State<Arc<AppState>>,
    Extension(Identity(identity)): Extension<Identity>,
    Query(query): Query<RoomQuery>,
) -> Result<Response, ServerError> {
    let room_id = RoomId::parse(&query.room_id)?;
    let role = match state.store.room_role(&room_id, &identity).await {
        Ok(role) => role,
        Err(StoreError::RoomNotFound(_)) => {
            return Ok(Redirect::to("/unknownroom").into_response());
        }
        Err(e) => {
            warn!(room = %room_id, "Room role lookup failed: {}", e);
            return Err(e.into());
        }
    };

    let websocket_url = format!("{}?roomId={}", state.config.websocket_url, room_id);
    Ok(Json(RoomEntry {
        room_id,
        role,
        websocket_url,
    })
    .into_response())
}
