//! Invitations received from other peers.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use troupe_core::error::CoordinationError;

use super::coordinator::{GroupEventCoordinator, Shared};

/// A pending invitation to join a remote session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invitation {
    pub session_id: String,
    pub template_id: String,
    pub template_name: String,
    pub description: String,
    pub inviter_id: String,
    /// The inviter's nickname, when the peer registry knows it.
    pub inviter_nickname: Option<String>,
    pub min_participants: usize,
    pub max_participants: usize,
    /// Whole seconds.
    pub estimated_time_secs: u64,
    pub received_at: DateTime<Utc>,
}

/// Accept-or-decline continuation handed to the invitation handler together
/// with the invitation. Consumed by either answer.
pub struct InvitationReply {
    coordinator: Weak<Shared>,
    invitation: Invitation,
}

impl InvitationReply {
    pub(crate) fn new(coordinator: Weak<Shared>, invitation: Invitation) -> Self {
        Self {
            coordinator,
            invitation,
        }
    }

    /// The invitation being answered.
    #[must_use]
    pub fn invitation(&self) -> &Invitation {
        &self.invitation
    }

    /// Joins the session: creates a local mirror of it and announces the
    /// local peer as a participant.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::Detached` if the coordinator is gone,
    /// otherwise any error from
    /// [`GroupEventCoordinator::accept_invitation`].
    pub async fn accept(self) -> Result<(), CoordinationError> {
        let shared = self
            .coordinator
            .upgrade()
            .ok_or(CoordinationError::Detached)?;
        GroupEventCoordinator::from_shared(shared)
            .accept_invitation(&self.invitation)
            .await
    }

    /// Declines the invitation. Nothing is sent to the inviter.
    pub fn decline(self) {
        info!(
            session_id = %self.invitation.session_id,
            inviter_id = %self.invitation.inviter_id,
            "group event invitation declined"
        );
    }
}

impl std::fmt::Debug for InvitationReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvitationReply")
            .field("invitation", &self.invitation)
            .finish_non_exhaustive()
    }
}

/// Presents an invitation to the user. Must not block; answer later through
/// the [`InvitationReply`].
pub type InvitationHandler = Arc<dyn Fn(Invitation, InvitationReply) + Send + Sync>;
