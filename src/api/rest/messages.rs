//! Message endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{authenticate, ApiError};
use crate::api::state::AppState;
use crate::types::CreateMessageRequest;

/// Query parameters for scrollback
#[derive(Debug, Deserialize)]
pub struct ScrollbackParams {
    /// Only messages strictly older than this (RFC 3339); now when absent
    pub timestamp: Option<DateTime<Utc>>,
}

/// POST /messages
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = authenticate(&state, &headers)?;
    let message = state
        .hub
        .post_message(&username, request.room_id, &request.message)?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /messages/:room_id - one page of scrollback as a historical batch
pub async fn messages_before(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
    Query(params): Query<ScrollbackParams>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    Ok(Json(state.hub.messages_before(room_id, params.timestamp)?))
}
