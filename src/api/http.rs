//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::rest::{accounts, events, messages, rooms};
use super::sse::handler::connect_handler;
use super::state::AppState;

/// Create the Axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Event stream
        .route("/connect", get(connect_handler))
        // Health check
        .route("/health", get(health_check))
        // Accounts
        .route("/signup", post(accounts::signup))
        .route("/signin", post(accounts::signin))
        // Rooms
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/order", put(rooms::reorder_rooms))
        .route(
            "/rooms/:room_id",
            get(rooms::get_room).delete(rooms::delete_room),
        )
        .route(
            "/rooms/:room_id/star",
            put(rooms::star_room).delete(rooms::unstar_room),
        )
        // Messages
        .route("/messages", post(messages::post_message))
        .route("/messages/:room_id", get(messages::messages_before))
        // Event log access
        .route("/events", get(events::list_events))
        .route("/stats", get(events::get_stats))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::JwtAuth;
    use crate::config::ServerConfig;
    use crate::hub::ChatHub;
    use axum::body::Body;
    use axum::http::Request;
    use tower::util::ServiceExt;

    fn app() -> Router {
        let auth = JwtAuth::new("router-test-secret-that-is-long-enough").with_hash_cost(4);
        let state = AppState::new(
            Arc::new(ChatHub::in_memory()),
            Arc::new(auth),
            &ServerConfig::default(),
        );
        create_router(Arc::new(state))
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
    }

    #[tokio::test]
    async fn test_protected_routes_require_token() {
        for uri in ["/rooms", "/events", "/stats", "/connect"] {
            let response = app()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), 401, "{}", uri);
        }
    }
}
