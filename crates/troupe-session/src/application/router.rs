//! Inbound message router.
//!
//! Applies messages from other peers to the local store. The envelope's
//! `sender` is the acting participant; the transport sender (the origin) is
//! the peer that relayed it and is what registry checks and replies use.
//! Messages for sessions this peer does not know are ignored, as are stale
//! phase announcements.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use troupe_core::error::CoordinationError;
use troupe_core::transport::MessageHandler;

use super::coordinator::{GroupEventCoordinator, Shared, roster_of};
use super::invitation::{Invitation, InvitationReply};
use crate::domain::messages::{
    AdvancePayload, EndPayload, InvitePayload, JoinPayload, MessageBody, VotePayload, WireMessage,
};

/// Handler registered for the group event message type.
pub(crate) struct MessageRouter {
    shared: Weak<Shared>,
}

impl MessageRouter {
    pub(crate) fn new(shared: Weak<Shared>) -> Self {
        Self { shared }
    }
}

#[async_trait]
impl MessageHandler for MessageRouter {
    async fn handle(&self, payload: &[u8], sender_peer_id: &str) -> Result<(), CoordinationError> {
        let shared = self.shared.upgrade().ok_or(CoordinationError::Detached)?;
        let message = WireMessage::decode(payload)?;
        GroupEventCoordinator::from_shared(shared)
            .apply_remote(message, sender_peer_id)
            .await
    }
}

impl GroupEventCoordinator {
    #[instrument(skip(self, message), fields(kind = %message.kind(), session_id = %message.session_id, sender = %message.sender))]
    async fn apply_remote(&self, message: WireMessage, origin: &str) -> Result<(), CoordinationError> {
        let WireMessage {
            session_id,
            sender,
            timestamp,
            body,
        } = message;
        if origin == self.local_peer_id() {
            return Ok(());
        }
        match body {
            MessageBody::Invite(invite) => {
                self.on_invite(session_id, sender, origin, timestamp, invite)
            }
            MessageBody::Join(join) => self.on_join(&session_id, &sender, origin, &join).await,
            MessageBody::Vote(vote) => {
                self.on_vote(&session_id, &sender, &vote);
                Ok(())
            }
            MessageBody::Advance(advance) => self.on_advance(&session_id, &advance),
            MessageBody::End(end) => self.on_end(&session_id, &sender, timestamp, end),
        }
    }

    fn on_invite(
        &self,
        session_id: String,
        inviter_id: String,
        origin: &str,
        received_at: chrono::DateTime<chrono::Utc>,
        invite: InvitePayload,
    ) -> Result<(), CoordinationError> {
        if self.shared.state.read().sessions.contains(&session_id) {
            debug!("invite for a session already known");
            return Ok(());
        }
        let mut inviter_nickname = None;
        if let Some(registry) = &self.shared.registry {
            if !registry.is_valid_peer(origin) {
                warn!(origin, "invite from an invalid peer rejected");
                return Err(CoordinationError::UnknownPeer(origin.to_owned()));
            }
            inviter_nickname = registry.peer_info(origin).ok().and_then(|info| info.nickname);
        }
        if self.shared.catalog.get(&invite.template_id).is_none() {
            return Err(CoordinationError::TemplateNotFound(invite.template_id));
        }
        let invitation = Invitation {
            session_id,
            template_id: invite.template_id,
            template_name: invite.template_name,
            description: invite.description,
            inviter_id,
            inviter_nickname,
            min_participants: invite.min_participants,
            max_participants: invite.max_participants,
            estimated_time_secs: invite.estimated_time,
            received_at,
        };

        match &self.shared.invitation_handler {
            Some(handler) => {
                let reply = InvitationReply::new(Arc::downgrade(&self.shared), invitation.clone());
                handler(invitation, reply);
            }
            None => info!(
                session_id = %invitation.session_id,
                "no invitation handler configured; invitation declined"
            ),
        }
        Ok(())
    }

    async fn on_join(
        &self,
        session_id: &str,
        sender: &str,
        origin: &str,
        join: &JoinPayload,
    ) -> Result<(), CoordinationError> {
        let local = self.local_peer_id();
        let roster_reply = {
            let mut state = self.shared.state.write();
            let Some(session) = state.sessions.get_mut(session_id) else {
                debug!("join for an unknown session");
                return Ok(());
            };
            let newcomer = !session.is_participant(sender);
            if newcomer {
                session.add_participant(sender, self.clock())?;
            }
            let merged = session.merge_participants(&join.participants, self.clock());
            debug!(newcomer, merged = merged.len(), "roster updated");
            (newcomer && session.is_initiator(&local)).then(|| roster_of(session))
        };

        if let Some(roster) = roster_reply {
            self.send_to(session_id, &local, MessageBody::Join(roster), origin)
                .await?;
        }
        Ok(())
    }

    fn on_vote(&self, session_id: &str, sender: &str, vote: &VotePayload) {
        let mut state = self.shared.state.write();
        let Some(session) = state.sessions.get_mut(session_id) else {
            debug!("vote for an unknown session");
            return;
        };
        session.touch(self.clock());
        if let Err(e) = session.record_vote(sender, &vote.choice_id, self.clock()) {
            debug!(error = %e, "remote vote not replicated");
        }
    }

    fn on_advance(&self, session_id: &str, advance: &AdvancePayload) -> Result<(), CoordinationError> {
        let mut state = self.shared.state.write();
        let Some(session) = state.sessions.get_mut(session_id) else {
            debug!("advance for an unknown session");
            return Ok(());
        };
        if session.apply_remote_advance(&advance.new_phase, &advance.scores, self.clock())? {
            debug!(phase = %advance.new_phase, "remote advance applied");
        } else {
            debug!(phase = %advance.new_phase, "stale advance ignored");
        }
        Ok(())
    }

    fn on_end(
        &self,
        session_id: &str,
        sender: &str,
        completed_at: chrono::DateTime<chrono::Utc>,
        end: EndPayload,
    ) -> Result<(), CoordinationError> {
        let mut state = self.shared.state.write();
        let Some(session) = state.sessions.get(session_id) else {
            debug!("end for an unknown session");
            return Ok(());
        };

        if end.completed {
            if !session.is_participant(sender) && !session.is_initiator(sender) {
                warn!("completion from a non-participant rejected");
                return Err(CoordinationError::NotAParticipant {
                    session_id: session_id.to_owned(),
                    participant_id: sender.to_owned(),
                });
            }
            let mut summary = session.completion_summary(completed_at);
            summary.duration_secs = end.duration;
            summary.final_scores = end.final_scores;
            state.sessions.remove(session_id);
            let written = state.history.append(&summary);
            info!(records = written, "remote group event completed");
            return Ok(());
        }

        if !session.is_initiator(sender) {
            warn!("cancel from a peer other than the initiator rejected");
            return Err(CoordinationError::NotInitiator {
                session_id: session_id.to_owned(),
                initiator_id: session.initiator_id().to_owned(),
            });
        }
        state.sessions.remove(session_id);
        info!("group event cancelled remotely");
        Ok(())
    }
}
