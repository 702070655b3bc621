//! Error types for group event coordination.

use thiserror::Error;

/// Failure reported by a transport implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The target peer is not connected.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// The transport has been shut down.
    #[error("transport closed")]
    Closed,

    /// Any other delivery failure.
    #[error("transport failure: {0}")]
    Other(String),
}

/// Failure to decode an inbound wire message.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The envelope is not a valid group event message.
    #[error("malformed group event message: {0}")]
    Malformed(String),

    /// The envelope names a message type this peer does not understand.
    #[error("unknown group event message type: {0}")]
    UnknownMessageType(String),

    /// The data payload does not match the schema of its message type.
    #[error("malformed {kind} payload: {reason}")]
    Payload {
        /// The message type whose payload failed to decode.
        kind: &'static str,
        /// Decoder error text.
        reason: String,
    },
}

/// Top-level error type for session coordination.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// No template with this ID exists in the catalog.
    #[error("group event template not found: {0}")]
    TemplateNotFound(String),

    /// No active session with this ID exists.
    #[error("group event not found: {0}")]
    SessionNotFound(String),

    /// The named phase does not exist in the session's template.
    #[error("invalid phase: {0}")]
    InvalidPhase(String),

    /// The choice is not offered by the current phase.
    #[error("invalid choice: {0}")]
    InvalidChoice(String),

    /// The peer is not a participant in the session.
    #[error("{participant_id} is not a participant in event {session_id}")]
    NotAParticipant {
        /// The session that was addressed.
        session_id: String,
        /// The offending peer.
        participant_id: String,
    },

    /// The peer already participates in the session.
    #[error("{participant_id} is already a participant in event {session_id}")]
    AlreadyParticipant {
        /// The session that was addressed.
        session_id: String,
        /// The duplicate peer.
        participant_id: String,
    },

    /// The session has reached its maximum participant count.
    #[error("event {session_id} is full: {max} participants")]
    SessionFull {
        /// The session that was addressed.
        session_id: String,
        /// The template's participant limit.
        max: usize,
    },

    /// Not enough peers are connected to start the template.
    #[error("insufficient participants: need {required}, have {available}")]
    InsufficientParticipants {
        /// The template's minimum participant count.
        required: usize,
        /// Connected peers plus the local peer.
        available: usize,
    },

    /// Only the session initiator may perform this operation.
    #[error("only the initiator {initiator_id} may control event {session_id}")]
    NotInitiator {
        /// The session that was addressed.
        session_id: String,
        /// The session's initiator.
        initiator_id: String,
    },

    /// The peer registry does not recognise this peer.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// A broadcast or send failed.
    #[error("failed to deliver {message} message: {source}")]
    Transport {
        /// The wire message type that could not be delivered.
        message: &'static str,
        /// The underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// An inbound message could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The coordinator backing this handle has been dropped.
    #[error("coordinator is no longer running")]
    Detached,

    /// An internal invariant could not be upheld.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinationError {
    /// Returns `true` for the not-found family of errors.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TemplateNotFound(_)
                | Self::SessionNotFound(_)
                | Self::InvalidPhase(_)
                | Self::InvalidChoice(_)
        )
    }

    /// Returns `true` for the policy-violation family of errors.
    #[must_use]
    pub fn is_policy_violation(&self) -> bool {
        matches!(
            self,
            Self::NotAParticipant { .. }
                | Self::AlreadyParticipant { .. }
                | Self::SessionFull { .. }
                | Self::InsufficientParticipants { .. }
                | Self::NotInitiator { .. }
                | Self::UnknownPeer(_)
        )
    }
}
