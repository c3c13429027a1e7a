//! Shared application state for the HTTP handlers

use std::sync::Arc;
use std::time::Duration;

use crate::auth::JwtAuth;
use crate::config::ServerConfig;
use crate::hub::ChatHub;

pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub auth: Arc<JwtAuth>,
    /// Interval between SSE keep-alive comments
    pub keep_alive: Duration,
}

impl AppState {
    pub fn new(hub: Arc<ChatHub>, auth: Arc<JwtAuth>, config: &ServerConfig) -> Self {
        Self {
            hub,
            auth,
            keep_alive: config.keep_alive,
        }
    }
}
