//! API module for the HTTP surface
//!
//! REST endpoints for accounts, rooms and messages plus the SSE event
//! stream every client keeps open.

pub mod http;
pub mod rest;
pub mod sse;
pub mod state;

pub use http::create_router;
pub use rest::ApiError;
pub use state::AppState;
