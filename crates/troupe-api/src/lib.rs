//! Troupe playground: an HTTP server hosting simulated peers.
//!
//! Every peer runs its own coordinator on a shared in-process bus, so a
//! whole group event can be driven end to end with plain HTTP calls.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the complete application router.
pub fn app(state: AppState) -> Router {
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/templates", routes::templates::router())
        .nest(
            "/api/v1/peers",
            routes::peers::router().merge(routes::sessions::router()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
