//! Roomcast Chat Server - Binary Entry Point

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use roomcast::api::{create_router, AppState};
use roomcast::{ChatHub, JwtAuth, ServerConfig};

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("roomcast=info,tower_http=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = ServerConfig::from_env();
    let auth = Arc::new(JwtAuth::from_env()?);
    let hub = Arc::new(ChatHub::open(&config)?);

    let state = Arc::new(AppState::new(Arc::clone(&hub), auth, &config));
    let router = create_router(state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(
        addr = %listener.local_addr()?,
        version = roomcast::VERSION,
        "roomcast server started"
    );

    let shutdown_hub = Arc::clone(&hub);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            let closed = shutdown_hub.shutdown();
            info!(sessions = closed, "shutting down");
        })
        .await;

    if let Err(e) = served {
        error!(error = %e, "server error");
        return Err(e.into());
    }

    info!("server stopped");
    Ok(())
}
