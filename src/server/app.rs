use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use super::api::{self, AppState, SharedState};
use crate::config::Config;
use crate::pipeline::Orchestrator;

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router().with_state(state)
}

/// Run the HTTP service until Ctrl+C.
pub async fn start_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState {
        orchestrator: Orchestrator::from_config(&config),
        idle_keepalive: config.pipeline.idle_keepalive(),
    });

    let mut app = build_router(state);
    if config.server.cors_permissive {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        cors_permissive = config.server.cors_permissive,
        authenticated = config.github.token.is_some(),
        "grwm server listening"
    );
    println!("grwm running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received");
}
