//! SSE (Server-Sent Events) transport for the event stream
//!
//! ## Endpoints
//! - `GET /connect` - authenticated stream of backlog then live events
//!
//! Each event is one frame: `event: <kind>` and `data: <event json>`.
//! A catch-up failure ends the stream with a single `error` frame.

pub mod handler;

use serde::Serialize;

/// Payload of the final `error` frame
#[derive(Debug, Clone, Serialize)]
pub struct ErrorFrame {
    pub code: String,
    pub message: String,
}
