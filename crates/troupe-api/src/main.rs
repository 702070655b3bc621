//! Troupe playground API server entry point.

use std::sync::Arc;

use troupe_api::config::AppConfig;
use troupe_api::error::AppError;
use troupe_api::state::AppState;
use troupe_catalog::TemplateCatalog;
use troupe_core::clock::SystemClock;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Troupe playground server");

    // Read configuration from environment.
    let config = AppConfig::from_env()?;

    // Load the template catalog.
    let catalog = match &config.templates_path {
        Some(path) => TemplateCatalog::from_path(path)?,
        None => TemplateCatalog::builtin()?,
    };

    // Build application state and connect the seed peers.
    let app_state = AppState::new(
        Arc::new(catalog),
        Arc::new(SystemClock),
        config.coordinator_config(),
        config.sweep_interval,
    );
    for peer_id in &config.peers {
        app_state
            .connect_peer(peer_id)
            .map_err(|e| AppError::Config(format!("TROUPE_PEERS: {e}")))?;
    }

    // Build router.
    let app = troupe_api::app(app_state);

    // Start server.
    let addr = config.socket_addr()?;
    tracing::info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
