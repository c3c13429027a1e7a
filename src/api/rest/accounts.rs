//! Account endpoints

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::json;

use super::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// POST /signup - create an account
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = Arc::clone(&state.auth);
    let username = credentials.username.trim().to_string();

    // bcrypt is CPU bound
    tokio::task::spawn_blocking(move || auth.signup(&credentials.username, &credentials.password))
        .await
        .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok((StatusCode::CREATED, Json(json!({ "username": username }))))
}

/// POST /signin - exchange a password for a bearer token
pub async fn signin(
    State(state): State<Arc<AppState>>,
    Json(credentials): Json<Credentials>,
) -> Result<impl IntoResponse, ApiError> {
    let auth = Arc::clone(&state.auth);

    let token = tokio::task::spawn_blocking(move || {
        auth.signin(&credentials.username, &credentials.password)
    })
    .await
    .map_err(|e| ApiError::internal(e.to_string()))??;

    Ok(Json(token))
}
