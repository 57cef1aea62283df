//! Gemini Relay - Main entry point
//!
//! Loads settings once from the environment, builds the router, and serves it.

use anyhow::{Context, Result};
use gemini_relay::{
    build_router,
    core::{init_metrics, init_tracing},
    services::create_http_client,
    AppState, Settings,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    init_tracing();
    init_metrics();

    let settings = Settings::from_env()?;
    tracing::info!(settings = ?settings, "Configuration loaded");

    if !settings.has_api_key() {
        tracing::warn!("GENIE_API_KEY is not set; every reply will be a diagnostic message");
    }
    if settings.client_tokens.is_empty() {
        tracing::warn!("VALID_CLIENT_TOKENS is empty; every request will be rejected");
    }
    if settings.allowed_origins.is_empty() {
        tracing::info!("ALLOWED_ORIGINS is empty; requests from any origin are accepted");
    }

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let http_client = create_http_client(&settings)?;
    let state = Arc::new(AppState::new(settings, http_client));

    if let Some(_sweeper) = state.sessions.spawn_sweeper() {
        tracing::info!(
            idle_timeout_secs = state.settings.sessions.idle_timeout_secs,
            "Idle session sweeper started"
        );
    }

    let app = build_router(state);

    tracing::info!("Starting Gemini relay on {}", addr);
    tracing::info!("Relay API: /v1/chat, /v1/start_session, /v1/send_message, /v1/end_session");
    tracing::info!("Metrics endpoint: /metrics");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolve when the process receives Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
