//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use troupe_catalog::CatalogError;
use troupe_core::error::CoordinationError;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// An environment variable is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// The template catalog could not be loaded.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
}

/// HTTP-layer error that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// A coordinator operation failed.
    #[error(transparent)]
    Coordination(#[from] CoordinationError),

    /// No simulated peer with this ID is hosted.
    #[error("peer not found: {0}")]
    PeerNotFound(String),

    /// A simulated peer with this ID is already hosted.
    #[error("peer already connected: {0}")]
    PeerAlreadyConnected(String),

    /// The peer holds no pending invitation for the session.
    #[error("no pending invitation for {session_id} at peer {peer_id}")]
    InvitationNotFound {
        /// The peer whose inbox was searched.
        peer_id: String,
        /// The session the invitation was for.
        session_id: String,
    },
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::PeerNotFound(_) => (StatusCode::NOT_FOUND, "peer_not_found"),
            Self::PeerAlreadyConnected(_) => (StatusCode::CONFLICT, "peer_already_connected"),
            Self::InvitationNotFound { .. } => (StatusCode::NOT_FOUND, "invitation_not_found"),
            Self::Coordination(err) => match err {
                CoordinationError::TemplateNotFound(_) => {
                    (StatusCode::NOT_FOUND, "template_not_found")
                }
                CoordinationError::SessionNotFound(_) => {
                    (StatusCode::NOT_FOUND, "session_not_found")
                }
                CoordinationError::InvalidPhase(_) => (StatusCode::NOT_FOUND, "invalid_phase"),
                CoordinationError::InvalidChoice(_) => (StatusCode::NOT_FOUND, "invalid_choice"),
                CoordinationError::AlreadyParticipant { .. } => {
                    (StatusCode::CONFLICT, "already_participant")
                }
                CoordinationError::SessionFull { .. } => (StatusCode::CONFLICT, "session_full"),
                CoordinationError::NotAParticipant { .. } => {
                    (StatusCode::FORBIDDEN, "not_a_participant")
                }
                CoordinationError::NotInitiator { .. } => (StatusCode::FORBIDDEN, "not_initiator"),
                CoordinationError::UnknownPeer(_) => (StatusCode::FORBIDDEN, "unknown_peer"),
                CoordinationError::InsufficientParticipants { .. } => {
                    (StatusCode::PRECONDITION_FAILED, "insufficient_participants")
                }
                CoordinationError::Decode(_) => (StatusCode::BAD_REQUEST, "decode_error"),
                CoordinationError::Transport { .. } => (StatusCode::BAD_GATEWAY, "transport_error"),
                CoordinationError::Detached | CoordinationError::Internal(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_core::error::{DecodeError, TransportError};

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_not_found_family_maps_to_404() {
        assert_eq!(
            status_of(CoordinationError::SessionNotFound("group_x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoordinationError::TemplateNotFound("nope".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(CoordinationError::InvalidChoice("z".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_membership_conflicts_map_to_409() {
        assert_eq!(
            status_of(CoordinationError::SessionFull {
                session_id: "group_x".into(),
                max: 2,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CoordinationError::AlreadyParticipant {
                session_id: "group_x".into(),
                participant_id: "bob".into(),
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_authorization_failures_map_to_403() {
        assert_eq!(
            status_of(CoordinationError::NotInitiator {
                session_id: "group_x".into(),
                initiator_id: "alice".into(),
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(CoordinationError::UnknownPeer("mallory".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_insufficient_participants_maps_to_412() {
        assert_eq!(
            status_of(CoordinationError::InsufficientParticipants {
                required: 3,
                available: 1,
            }),
            StatusCode::PRECONDITION_FAILED
        );
    }

    #[test]
    fn test_decode_and_transport_failures() {
        assert_eq!(
            status_of(CoordinationError::from(DecodeError::Malformed("eof".into()))),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CoordinationError::Transport {
                message: "vote",
                source: TransportError::Closed,
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(CoordinationError::Detached),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_playground_errors() {
        assert_eq!(
            status_of(ApiError::PeerNotFound("ghost".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApiError::PeerAlreadyConnected("alice".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApiError::InvitationNotFound {
                peer_id: "bob".into(),
                session_id: "group_x".into(),
            }),
            StatusCode::NOT_FOUND
        );
    }
}
