//! Routes for browsing the template catalog.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get};
use troupe_catalog::Template;
use troupe_core::error::CoordinationError;

use crate::error::ApiError;
use crate::state::AppState;

/// GET /
async fn list_templates(State(state): State<AppState>) -> Json<Vec<Template>> {
    Json(state.catalog.templates().to_vec())
}

/// GET /{template_id}
async fn get_template(
    State(state): State<AppState>,
    Path(template_id): Path<String>,
) -> Result<Json<Template>, ApiError> {
    state
        .catalog
        .get(&template_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| CoordinationError::TemplateNotFound(template_id).into())
}

/// Returns the router for the template catalog.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_templates))
        .route("/{template_id}", get(get_template))
}
