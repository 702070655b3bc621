//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;
use troupe_catalog::TemplateCatalog;
use troupe_core::clock::Clock;
use troupe_session::CoordinatorConfig;
use troupe_test_support::FixedClock;

use troupe_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// Build application state over the built-in catalog with a fixed clock and
/// no background sweeper.
pub fn build_test_state() -> AppState {
    let catalog = Arc::new(TemplateCatalog::builtin().unwrap());
    AppState::new(catalog, fixed_clock(), CoordinatorConfig::default(), None)
}

/// Build the full app router. Uses the same route structure as `main.rs`.
pub fn build_test_app() -> (AppState, Router) {
    let state = build_test_state();
    let app = troupe_api::app(state.clone());
    (state, app)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(app: Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a POST request without a body and return the response.
pub async fn post_empty(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a DELETE request and return the status.
pub async fn delete(app: Router, uri: &str) -> StatusCode {
    let request = Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await.0
}

/// Connect each peer through the API.
pub async fn connect_peers(app: &Router, peers: &[&str]) {
    for peer in peers {
        let (status, _) = post_json(
            app.clone(),
            "/api/v1/peers",
            &serde_json::json!({ "peer_id": peer }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}
