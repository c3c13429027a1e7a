//! REST API module for HTTP endpoints
//!
//! - `POST /signup`, `POST /signin` - accounts
//! - `GET|POST /rooms`, `DELETE /rooms/:room_id`, `PUT /rooms/order`,
//!   `PUT|DELETE /rooms/:room_id/star` - rooms
//! - `POST /messages`, `GET /messages/:room_id` - messages and scrollback
//! - `GET /events` - durable events by order number
//! - `GET /stats` - server counters

pub mod accounts;
pub mod events;
pub mod messages;
pub mod rooms;

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use super::state::AppState;
use crate::auth::{AuthError, CredentialVerifier};
use crate::error::{ChatError, StorageError};

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(skip)]
    pub status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: code.to_string(),
            status,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, "CONFLICT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::UserExists => Self::conflict(err.to_string()),
            AuthError::InvalidUsername | AuthError::WeakPassword => {
                Self::bad_request(err.to_string())
            }
            AuthError::HashError(_) | AuthError::InvalidSecret(_) => {
                error!(error = %err, "authentication backend failure");
                Self::internal(err.to_string())
            }
            _ => Self::unauthorized(err.to_string()),
        }
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Auth(auth) => auth.into(),
            ChatError::Storage(StorageError::NotFound(_)) => Self::not_found(err.to_string()),
            ChatError::Storage(StorageError::Conflict(_)) => Self::conflict(err.to_string()),
            ChatError::Storage(StorageError::Invalid(_)) | ChatError::Validation(_) => {
                Self::bad_request(err.to_string())
            }
            ChatError::Storage(_) => {
                error!(error = %err, "storage failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.code(), err.to_string())
            }
        }
    }
}

/// Raw `Authorization` header value
pub fn bearer_credential(headers: &HeaderMap) -> Option<&str> {
    headers.get(AUTHORIZATION).and_then(|value| value.to_str().ok())
}

/// Resolve the caller's identity from the `Authorization` header
pub fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let credential = bearer_credential(headers).ok_or(AuthError::MissingToken)?;
    Ok(state.auth.verify(credential)?)
}
