//! Routes for hosting simulated peers and answering their invitations.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::delete, routing::get, routing::post};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use troupe_session::{CompletedRecord, Invitation, SweepReport};

use crate::error::ApiError;
use crate::routes::sessions::ActionResponse;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct ConnectPeerRequest {
    /// ID of the simulated peer to connect.
    pub peer_id: String,
}

/// Response body returned after a peer connects.
#[derive(Debug, Serialize)]
pub struct PeerResponse {
    pub peer_id: String,
    /// Every peer on the bus, including this one.
    pub connected_peers: Vec<String>,
}

/// GET /
async fn list_peers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.peer_ids())
}

/// POST /
#[instrument(skip_all, fields(peer_id = %request.peer_id))]
async fn connect_peer(
    State(state): State<AppState>,
    Json(request): Json<ConnectPeerRequest>,
) -> Result<(StatusCode, Json<PeerResponse>), ApiError> {
    info!("handling connect_peer command");

    state.connect_peer(&request.peer_id)?;

    Ok((
        StatusCode::CREATED,
        Json(PeerResponse {
            peer_id: request.peer_id,
            connected_peers: state.peer_ids(),
        }),
    ))
}

/// DELETE /{peer_id}
#[instrument(skip_all, fields(peer_id = %peer_id))]
async fn disconnect_peer(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    info!("handling disconnect_peer command");

    state.disconnect_peer(&peer_id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /{peer_id}/history
async fn history(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<CompletedRecord>>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;
    Ok(Json(coordinator.history(&peer_id)))
}

/// GET /{peer_id}/invitations
async fn list_invitations(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<Invitation>>, ApiError> {
    Ok(Json(state.inbox(&peer_id)?.list()))
}

/// POST /{peer_id}/invitations/{session_id}/accept
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id))]
async fn accept_invitation(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;
    let reply = state
        .inbox(&peer_id)?
        .take(&session_id)
        .ok_or_else(|| ApiError::InvitationNotFound {
            peer_id: peer_id.clone(),
            session_id: session_id.clone(),
        })?;

    info!("handling accept_invitation command");

    reply.accept().await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// POST /{peer_id}/invitations/{session_id}/decline
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id))]
async fn decline_invitation(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let reply = state
        .inbox(&peer_id)?
        .take(&session_id)
        .ok_or_else(|| ApiError::InvitationNotFound {
            peer_id: peer_id.clone(),
            session_id: session_id.clone(),
        })?;

    reply.decline();
    Ok(StatusCode::NO_CONTENT)
}

/// POST /{peer_id}/sweep
#[instrument(skip_all, fields(peer_id = %peer_id))]
async fn sweep(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<SweepReport>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;
    Ok(Json(coordinator.sweep().await))
}

/// Returns the router for simulated peers.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_peers).post(connect_peer))
        .route("/{peer_id}", delete(disconnect_peer))
        .route("/{peer_id}/history", get(history))
        .route("/{peer_id}/invitations", get(list_invitations))
        .route(
            "/{peer_id}/invitations/{session_id}/accept",
            post(accept_invitation),
        )
        .route(
            "/{peer_id}/invitations/{session_id}/decline",
            post(decline_invitation),
        )
        .route("/{peer_id}/sweep", post(sweep))
}
