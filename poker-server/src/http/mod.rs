//! HTTP server module

mod api;
pub(crate) mod pages;

use std::sync::Arc;

use axum::{
    Extension, Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::middleware::{AuthGate, CookieSettings, auth_gate};
use crate::ws::ws_handler;

pub use api::{HealthResponse, LOGIN_REJECTED, RoomEntry, RoomLookup, RoomQuery};

/// Create the HTTP router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let gate = AuthGate::new(
        Arc::clone(&state.sessions),
        CookieSettings::from_config(&state.config),
    );

    let protected = Router::new()
        .route("/loginform", get(pages::signed_in))
        .route("/rooms", get(api::find_room))
        .route("/create-room", post(api::create_room))
        .route("/room", get(api::enter_room))
        .route_layer(middleware::from_fn(auth_gate));

    Router::new()
        .route("/api/health", get(api::health))
        .route("/login", post(api::login))
        .route("/echo", get(ws_handler))
        .route("/bad-request", get(pages::bad_request))
        .route("/unknownroom", get(pages::unknown_room))
        .merge(protected)
        .layer(Extension(gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
