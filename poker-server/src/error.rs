//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use poker_core::{RoomIdError, StoreError};
use thiserror::Error;

/// Errors that can occur in the poker server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Query parameter is not a canonical room id
    #[error("invalid room id: {0}")]
    InvalidRoom(#[from] RoomIdError),

    /// The room store failed or refused a request
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Could not build the session cookie
    #[error("invalid session cookie: {0}")]
    Cookie(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::InvalidRoom(_) => StatusCode::BAD_REQUEST,
            ServerError::Store(StoreError::RoomNotFound(_)) => StatusCode::NOT_FOUND,
            ServerError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Store(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ServerError::Bind { .. } | ServerError::Cookie(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::debug!("Request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_room_is_bad_request() {
        let err: ServerError = RoomIdError::InvalidLength {
            expected: 36,
            actual: 3,
        }
        .into();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_room_is_not_found() {
        let err: ServerError = StoreError::RoomNotFound("x".to_string()).into();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_store_is_service_unavailable() {
        let err: ServerError = StoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn bind_error_displays_address() {
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        assert!(err.to_string().contains("127.0.0.1:1"));
    }
}
