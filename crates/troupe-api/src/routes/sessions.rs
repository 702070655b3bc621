//! Routes for driving a peer's group event sessions.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use troupe_core::error::CoordinationError;
use troupe_session::{GroupEventCoordinator, Session};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{peer_id}/sessions.
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Template to run.
    pub template_id: String,
}

/// Request body for POST .../vote.
#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub choice_id: String,
}

/// Request body for POST .../invite.
#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub target_peer_id: String,
}

/// A peer's view of one session.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub template_id: String,
    pub initiator_id: String,
    pub participants: Vec<String>,
    pub current_phase: String,
    pub phase_index: usize,
    /// Results of the previous phase.
    pub phase_data: BTreeMap<String, Value>,
    /// Choice ID to vote count in the current phase.
    pub votes: BTreeMap<String, u32>,
    pub scores: BTreeMap<String, i64>,
    pub completed_phases: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.session_id().to_owned(),
            template_id: session.template().id.clone(),
            initiator_id: session.initiator_id().to_owned(),
            participants: session.participants().to_vec(),
            current_phase: session.current_phase().name.clone(),
            phase_index: session.phase_index(),
            phase_data: session.phase_data().clone(),
            votes: session.tally().counts().clone(),
            scores: session.scores().clone(),
            completed_phases: session.completed_phases().to_vec(),
            started_at: session.started_at(),
            last_activity: session.last_activity(),
        }
    }
}

/// Response body returned after a session command is handled.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub session_id: String,
    /// `active`, or `closed` once the session has completed or ended.
    pub status: &'static str,
    /// The phase after the command; absent when closed.
    pub current_phase: Option<String>,
}

impl ActionResponse {
    /// Describes the session as `coordinator` sees it now.
    pub(crate) fn after(coordinator: &GroupEventCoordinator, session_id: &str) -> Self {
        let current_phase = coordinator
            .session(session_id)
            .map(|s| s.current_phase().name.clone());
        Self {
            session_id: session_id.to_owned(),
            status: if current_phase.is_some() { "active" } else { "closed" },
            current_phase,
        }
    }
}

/// GET /{peer_id}/sessions
async fn list_sessions(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
) -> Result<Json<Vec<SessionResponse>>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;
    let sessions = coordinator
        .active_sessions()
        .iter()
        .map(SessionResponse::from)
        .collect();
    Ok(Json(sessions))
}

/// POST /{peer_id}/sessions
#[instrument(skip_all, fields(peer_id = %peer_id, template_id = %request.template_id))]
async fn start_session(
    State(state): State<AppState>,
    Path(peer_id): Path<String>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling start_session command");

    let session_id = coordinator.start(&request.template_id, &peer_id).await?;
    let session = coordinator
        .session(&session_id)
        .ok_or(CoordinationError::SessionNotFound(session_id))?;

    Ok((StatusCode::CREATED, Json(SessionResponse::from(&session))))
}

/// GET /{peer_id}/sessions/{session_id}
async fn get_session(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .coordinator(&peer_id)?
        .session(&session_id)
        .ok_or(CoordinationError::SessionNotFound(session_id))?;
    Ok(Json(SessionResponse::from(&session)))
}

/// POST /{peer_id}/sessions/{session_id}/join
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id))]
async fn join_session(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling join command");

    coordinator.join(&session_id, &peer_id).await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// POST /{peer_id}/sessions/{session_id}/vote
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id, choice_id = %request.choice_id))]
async fn submit_vote(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling vote command");

    coordinator
        .submit_vote(&session_id, &peer_id, &request.choice_id)
        .await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// POST /{peer_id}/sessions/{session_id}/advance
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id))]
async fn advance_phase(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling advance command");

    coordinator.advance_phase(&session_id, &peer_id).await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// POST /{peer_id}/sessions/{session_id}/end
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id))]
async fn end_session(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling end command");

    coordinator.end_session(&session_id, &peer_id).await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// POST /{peer_id}/sessions/{session_id}/invite
#[instrument(skip_all, fields(peer_id = %peer_id, session_id = %session_id, target = %request.target_peer_id))]
async fn invite_peer(
    State(state): State<AppState>,
    Path((peer_id, session_id)): Path<(String, String)>,
    Json(request): Json<InviteRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let coordinator = state.coordinator(&peer_id)?;

    info!("handling invite command");

    coordinator
        .invite_peer(&session_id, &request.target_peer_id)
        .await?;
    Ok(Json(ActionResponse::after(&coordinator, &session_id)))
}

/// Returns the router for peer sessions. Nested under the peers prefix.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{peer_id}/sessions", get(list_sessions).post(start_session))
        .route("/{peer_id}/sessions/{session_id}", get(get_session))
        .route("/{peer_id}/sessions/{session_id}/join", post(join_session))
        .route("/{peer_id}/sessions/{session_id}/vote", post(submit_vote))
        .route("/{peer_id}/sessions/{session_id}/advance", post(advance_phase))
        .route("/{peer_id}/sessions/{session_id}/end", post(end_session))
        .route("/{peer_id}/sessions/{session_id}/invite", post(invite_peer))
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::state::tests::test_app_state;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body_bytes.is_empty() {
            Value::Null
        } else {
            // Axum's extractor rejections are plain text, not JSON.
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body_bytes).into_owned()))
        };
        (status, json)
    }

    fn app_with(peers: &[&str]) -> (AppState, Router) {
        let state = test_app_state();
        for peer in peers {
            state.connect_peer(peer).unwrap();
        }
        let app = router().with_state(state.clone());
        (state, app)
    }

    async fn start_campfire(app: &Router) -> String {
        let (status, json) = call(
            app,
            "POST",
            "/alice/sessions",
            Some(serde_json::json!({ "template_id": "campfire" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        json["session_id"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn test_start_session_returns_201_with_the_first_phase() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);

        // Act
        let (status, json) = call(
            &app,
            "POST",
            "/alice/sessions",
            Some(serde_json::json!({ "template_id": "campfire" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::CREATED);
        assert!(json["session_id"].as_str().unwrap().starts_with("group_"));
        assert_eq!(json["initiator_id"], "alice");
        assert_eq!(json["participants"], serde_json::json!(["alice"]));
        assert_eq!(json["current_phase"], "intro");
        assert_eq!(json["scores"]["alice"], 0);
    }

    #[tokio::test]
    async fn test_start_session_returns_412_when_alone() {
        // Arrange
        let (_state, app) = app_with(&["alice"]);

        // Act
        let (status, json) = call(
            &app,
            "POST",
            "/alice/sessions",
            Some(serde_json::json!({ "template_id": "campfire" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::PRECONDITION_FAILED);
        assert_eq!(json["error"], "insufficient_participants");
    }

    #[tokio::test]
    async fn test_start_session_returns_404_for_unknown_template() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);

        // Act
        let (status, json) = call(
            &app,
            "POST",
            "/alice/sessions",
            Some(serde_json::json!({ "template_id": "nope" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "template_not_found");
    }

    #[tokio::test]
    async fn test_start_session_returns_422_for_missing_body_fields() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);

        // Act
        let (status, _) = call(&app, "POST", "/alice/sessions", Some(serde_json::json!({}))).await;

        // Assert: Axum returns 422 for deserialization failures.
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_peer_returns_404() {
        // Arrange
        let (_state, app) = app_with(&["alice"]);

        // Act
        let (status, json) = call(&app, "GET", "/ghost/sessions", None).await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "peer_not_found");
    }

    #[tokio::test]
    async fn test_vote_advances_the_phase() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/vote"),
            Some(serde_json::json!({ "choice_id": "ready" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "active");
        assert_eq!(json["current_phase"], "choose");

        let (_, session) = call(&app, "GET", &format!("/alice/sessions/{session_id}"), None).await;
        assert_eq!(session["phase_data"]["previousPhase"], "intro");
        assert_eq!(session["phase_data"]["winningChoice"], "ready");
        assert_eq!(session["completed_phases"], serde_json::json!(["intro"]));
    }

    #[tokio::test]
    async fn test_vote_for_unknown_choice_returns_404() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/vote"),
            Some(serde_json::json!({ "choice_id": "ruins" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "invalid_choice");
    }

    #[tokio::test]
    async fn test_join_twice_returns_409() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/join"),
            None,
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "already_participant");
    }

    #[tokio::test]
    async fn test_vote_before_accepting_returns_404() {
        // Arrange
        let (state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;
        // Bob holds an invitation but has no local copy of the session yet.
        assert_eq!(state.inbox("bob").unwrap().list().len(), 1);

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/bob/sessions/{session_id}/vote"),
            Some(serde_json::json!({ "choice_id": "ready" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "session_not_found");
    }

    #[tokio::test]
    async fn test_advance_by_non_initiator_returns_403() {
        // Arrange
        let (state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;
        let reply = state.inbox("bob").unwrap().take(&session_id).unwrap();
        reply.accept().await.unwrap();

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/bob/sessions/{session_id}/advance"),
            None,
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "not_initiator");
    }

    #[tokio::test]
    async fn test_advance_by_initiator_moves_to_the_next_phase() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/advance"),
            None,
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["current_phase"], "choose");
    }

    #[tokio::test]
    async fn test_end_closes_the_session() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/end"),
            None,
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "closed");
        assert!(json["current_phase"].is_null());

        let (status, json) = call(&app, "GET", &format!("/alice/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "session_not_found");
    }

    #[tokio::test]
    async fn test_invite_unknown_target_returns_403() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/invite"),
            Some(serde_json::json!({ "target_peer_id": "mallory" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(json["error"], "unknown_peer");
    }

    #[tokio::test]
    async fn test_invite_reaches_a_peer_that_joined_later() {
        // Arrange
        let (state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;
        state.connect_peer("carol").unwrap();

        // Act
        let (status, _) = call(
            &app,
            "POST",
            &format!("/alice/sessions/{session_id}/invite"),
            Some(serde_json::json!({ "target_peer_id": "carol" })),
        )
        .await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let invitations = state.inbox("carol").unwrap().list();
        assert_eq!(invitations.len(), 1);
        assert_eq!(invitations[0].session_id, session_id);
    }

    #[tokio::test]
    async fn test_list_sessions_returns_active_sessions() {
        // Arrange
        let (_state, app) = app_with(&["alice", "bob"]);
        let session_id = start_campfire(&app).await;

        // Act
        let (status, json) = call(&app, "GET", "/alice/sessions", None).await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let sessions = json.as_array().unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], session_id.as_str());
    }
}
