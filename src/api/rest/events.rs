//! Event range and stats endpoints

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::{authenticate, ApiError};
use crate::api::state::AppState;
use crate::types::SharedEvent;

/// Query parameters for `GET /events`
#[derive(Debug, Deserialize)]
pub struct EventRangeParams {
    /// Exclusive lower bound
    pub after: Option<u64>,
    /// Inclusive upper bound, defaults to the highest committed order
    pub until: Option<u64>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

#[derive(Debug, Serialize)]
pub struct EventRange {
    pub events: Vec<SharedEvent>,
    pub highest_order: Option<u64>,
}

/// GET /events - committed events in `(after, until]`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<EventRangeParams>,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    let events = state
        .hub
        .events_between(params.after, params.until, params.limit)?;

    Ok(Json(EventRange {
        events,
        highest_order: state.hub.log().highest_order(),
    }))
}

/// GET /stats
pub async fn get_stats(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authenticate(&state, &headers)?;
    Ok(Json(state.hub.stats()))
}
