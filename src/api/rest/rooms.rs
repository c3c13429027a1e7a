//! Room endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use super::{authenticate, ApiError};
use crate::api::state::AppState;
use crate::types::{CreateRoomRequest, ReorderRoomsRequest};

/// GET /rooms - rooms in display order with the caller's stars
pub async fn list_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let username = authenticate(&state, &headers)?;
    Ok(Json(state.hub.list_rooms(&username)))
}

/// POST /rooms
pub async fn create_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    let room = state.hub.create_room(&request.name)?;
    Ok((StatusCode::CREATED, Json(room)))
}

/// GET /rooms/:room_id
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    Ok(Json(state.hub.room(room_id)?))
}

/// DELETE /rooms/:room_id
pub async fn delete_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    state.hub.delete_room(room_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /rooms/order
pub async fn reorder_rooms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<ReorderRoomsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    Ok(Json(state.hub.reorder_rooms(&request.room_ids)?))
}

/// PUT /rooms/:room_id/star
pub async fn star_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let username = authenticate(&state, &headers)?;
    state.hub.star_room(&username, room_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /rooms/:room_id/star
pub async fn unstar_room(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(room_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let username = authenticate(&state, &headers)?;
    state.hub.unstar_room(&username, room_id)?;
    Ok(StatusCode::NO_CONTENT)
}
