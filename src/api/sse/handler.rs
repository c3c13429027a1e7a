//! SSE connect handler

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use super::ErrorFrame;
use crate::api::rest::{bearer_credential, ApiError};
use crate::api::state::AppState;
use crate::error::{ChatError, ChatResult};
use crate::types::{Event, SharedEvent};

/// GET /connect - stream backlog then live events to the caller
///
/// Authentication failures are answered with 401 before any stream starts.
pub async fn connect_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let connection = match state
        .hub
        .open_connection(state.auth.as_ref(), bearer_credential(&headers))
    {
        Ok(connection) => connection,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let identity = connection.identity().to_string();
    let stream = event_frames(identity, connection.into_stream());

    Sse::new(stream)
        .keep_alive(KeepAlive::default().interval(state.keep_alive))
        .into_response()
}

/// SSE frames for a connection's events; an error ends the stream after
/// one `error` frame
pub(crate) fn event_frames<S>(
    identity: String,
    events: S,
) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send + 'static
where
    S: Stream<Item = ChatResult<SharedEvent>> + Send + 'static,
{
    let mut events = Box::pin(events);

    async_stream::stream! {
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => yield Ok::<_, Infallible>(event_frame(&event)),
                Err(e) => {
                    warn!(identity = %identity, error = %e, "ending stream after catch-up failure");
                    yield Ok(error_frame(&e));
                    break;
                }
            }
        }
        debug!(identity = %identity, "event stream ended");
    }
}

fn event_frame(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.kind.as_str())
        .data(serde_json::to_string(event).unwrap_or_default())
}

fn error_frame(err: &ChatError) -> SseEvent {
    let frame = ErrorFrame {
        code: err.code().to_string(),
        message: err.to_string(),
    };
    SseEvent::default()
        .event("error")
        .data(serde_json::to_string(&frame).unwrap_or_default())
}
