//! Group event coordinator.
//!
//! The coordinator is the local authority for every session this peer knows
//! about. Each operation mutates the store under one write lock, releases
//! it, and only then broadcasts the resulting message, so no lock is held
//! across a network call.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};
use troupe_catalog::{Template, TemplateCatalog};
use troupe_core::clock::{Clock, SystemClock};
use troupe_core::error::CoordinationError;
use troupe_core::peer::{PeerEvent, PeerRegistry};
use troupe_core::rng::{DeterministicRng, SystemRng};
use troupe_core::transport::Transport;
use uuid::Builder;

use super::invitation::{Invitation, InvitationHandler};
use super::router::MessageRouter;
use super::store::{StoreState, SweepReport};
use crate::domain::history::CompletedRecord;
use crate::domain::messages::{
    AdvancePayload, EndPayload, GROUP_EVENT_MESSAGE_TYPE, InvitePayload, JoinPayload, MessageBody,
    VotePayload, WireMessage,
};
use crate::domain::session::{PhaseTransition, Session};

const SESSION_ID_ATTEMPTS: usize = 8;

/// Tunables for a coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Sessions idle for this long are removed by [`GroupEventCoordinator::sweep`].
    pub idle_timeout: Duration,
    /// Force-advance phases that outlive their maximum duration.
    pub enforce_phase_deadlines: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
            enforce_phase_deadlines: true,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) catalog: Arc<TemplateCatalog>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Option<Arc<dyn PeerRegistry>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) rng: Mutex<Box<dyn DeterministicRng>>,
    pub(crate) invitation_handler: Option<InvitationHandler>,
    pub(crate) config: CoordinatorConfig,
    pub(crate) state: RwLock<StoreState>,
}

/// Builds a [`GroupEventCoordinator`].
pub struct CoordinatorBuilder {
    catalog: Arc<TemplateCatalog>,
    transport: Arc<dyn Transport>,
    registry: Option<Arc<dyn PeerRegistry>>,
    clock: Arc<dyn Clock>,
    rng: Box<dyn DeterministicRng>,
    invitation_handler: Option<InvitationHandler>,
    config: CoordinatorConfig,
}

impl CoordinatorBuilder {
    /// Validate inviters and receive peer lifecycle events from `registry`.
    #[must_use]
    pub fn peer_registry(mut self, registry: Arc<dyn PeerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn rng(mut self, rng: Box<dyn DeterministicRng>) -> Self {
        self.rng = rng;
        self
    }

    /// Present incoming invitations through `handler`. Without one, every
    /// invitation is declined.
    #[must_use]
    pub fn invitation_handler(mut self, handler: InvitationHandler) -> Self {
        self.invitation_handler = Some(handler);
        self
    }

    #[must_use]
    pub fn config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the message router with the transport and subscribes to
    /// peer events.
    #[must_use]
    pub fn build(self) -> GroupEventCoordinator {
        let shared = Arc::new(Shared {
            catalog: self.catalog,
            transport: self.transport,
            registry: self.registry,
            clock: self.clock,
            rng: Mutex::new(self.rng),
            invitation_handler: self.invitation_handler,
            config: self.config,
            state: RwLock::new(StoreState::default()),
        });

        shared.transport.register_handler(
            GROUP_EVENT_MESSAGE_TYPE,
            Arc::new(MessageRouter::new(Arc::downgrade(&shared))),
        );
        if let Some(registry) = &shared.registry {
            let weak = Arc::downgrade(&shared);
            registry.on_peer_event(Arc::new(move |event: PeerEvent, peer_id: &str| {
                if let Some(shared) = weak.upgrade() {
                    GroupEventCoordinator::from_shared(shared).handle_peer_event(event, peer_id);
                }
            }));
        }

        GroupEventCoordinator { shared }
    }
}

/// Coordinates the group events of one local peer. Cheap to clone.
#[derive(Clone)]
pub struct GroupEventCoordinator {
    pub(crate) shared: Arc<Shared>,
}

/// What a phase advance produced, waiting to be announced. `sender` is the
/// session's initiator, on whose behalf phase changes are broadcast.
pub(crate) enum Announcement {
    Advanced {
        session_id: String,
        sender: String,
        payload: AdvancePayload,
    },
    Ended {
        session_id: String,
        sender: String,
        payload: EndPayload,
    },
}

impl GroupEventCoordinator {
    /// Starts building a coordinator with the system clock and RNG.
    #[must_use]
    pub fn builder(catalog: Arc<TemplateCatalog>, transport: Arc<dyn Transport>) -> CoordinatorBuilder {
        CoordinatorBuilder {
            catalog,
            transport,
            registry: None,
            clock: Arc::new(SystemClock),
            rng: Box::new(SystemRng),
            invitation_handler: None,
            config: CoordinatorConfig::default(),
        }
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// ID of the local peer.
    #[must_use]
    pub fn local_peer_id(&self) -> String {
        self.shared.transport.local_peer_id()
    }

    /// Every template in the catalog.
    #[must_use]
    pub fn templates(&self) -> Vec<Template> {
        self.shared.catalog.templates().to_vec()
    }

    /// Snapshot of every active session, oldest first.
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Session> {
        let state = self.shared.state.read();
        let mut sessions: Vec<Session> = state.sessions.iter().cloned().collect();
        sessions.sort_by(|a, b| {
            a.started_at()
                .cmp(&b.started_at())
                .then_with(|| a.session_id().cmp(b.session_id()))
        });
        sessions
    }

    /// Snapshot of one session.
    #[must_use]
    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.shared.state.read().sessions.get(session_id).cloned()
    }

    /// Completed-session records for `participant_id`.
    #[must_use]
    pub fn history(&self, participant_id: &str) -> Vec<CompletedRecord> {
        self.shared.state.read().history.history(participant_id)
    }

    /// Starts a session of `template_id` with `initiator_id` as its only
    /// participant and broadcasts an invite.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound`, `InsufficientParticipants` when fewer
    /// peers are connected than the template needs, or `Transport` if the
    /// invite could not be broadcast. In that last case the session is
    /// removed again.
    #[instrument(skip(self))]
    pub async fn start(
        &self,
        template_id: &str,
        initiator_id: &str,
    ) -> Result<String, CoordinationError> {
        let template = self
            .shared
            .catalog
            .get(template_id)
            .cloned()
            .ok_or_else(|| CoordinationError::TemplateNotFound(template_id.to_owned()))?;
        let available = self.shared.transport.connected_peers().len() + 1;
        if available < template.min_participants {
            return Err(CoordinationError::InsufficientParticipants {
                required: template.min_participants,
                available,
            });
        }

        let (session_id, invite) = {
            let mut state = self.shared.state.write();
            let session_id = self.allocate_session_id(&state)?;
            let invite = InvitePayload::for_template(&template);
            let session = Session::new(session_id.clone(), template, initiator_id, self.clock())?;
            state.sessions.insert(session);
            (session_id, invite)
        };

        if let Err(e) = self
            .broadcast(&session_id, initiator_id, MessageBody::Invite(invite))
            .await
        {
            self.shared.state.write().sessions.remove(&session_id);
            warn!(session_id = %session_id, error = %e, "invite broadcast failed; session rolled back");
            return Err(e);
        }

        info!(session_id = %session_id, template_id, "group event started");
        Ok(session_id)
    }

    /// Adds `participant_id` to a session and broadcasts the new roster.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `AlreadyParticipant`, `SessionFull`, or
    /// `Transport` if the join could not be broadcast (the join stays
    /// recorded).
    #[instrument(skip(self))]
    pub async fn join(&self, session_id: &str, participant_id: &str) -> Result<(), CoordinationError> {
        let roster = {
            let mut state = self.shared.state.write();
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
            session.add_participant(participant_id, self.clock())?;
            roster_of(session)
        };

        info!(participants = roster.participant_count, "participant joined group event");
        self.broadcast(session_id, participant_id, MessageBody::Join(roster))
            .await
    }

    /// Records a vote and, when the phase's advance rule is met, advances
    /// the session in the same critical section. Broadcasts the vote, then
    /// the advance or end.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `NotAParticipant`, `InvalidChoice`, or the
    /// first `Transport` error among the broadcasts. State changes are kept
    /// on transport failure.
    #[instrument(skip(self))]
    pub async fn submit_vote(
        &self,
        session_id: &str,
        participant_id: &str,
        choice_id: &str,
    ) -> Result<(), CoordinationError> {
        let (vote, announcement) = {
            let mut state = self.shared.state.write();
            let session = state
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
            let outcome = session.record_vote(participant_id, choice_id, self.clock())?;
            let vote = VotePayload {
                choice_id: choice_id.to_owned(),
                total_votes: outcome.total_votes,
                can_advance: outcome.can_advance,
                votes: outcome.counts,
            };
            let announcement = if outcome.can_advance {
                Some(self.advance_locked(&mut state, session_id)?)
            } else {
                None
            };
            (vote, announcement)
        };

        debug!(total_votes = vote.total_votes, can_advance = vote.can_advance, "vote recorded");
        let sent = self
            .broadcast(session_id, participant_id, MessageBody::Vote(vote))
            .await;
        let announced = match announcement {
            Some(announcement) => self.announce(announcement).await,
            None => Ok(()),
        };
        sent.and(announced)
    }

    /// Advances a session regardless of votes. Only the initiator may do
    /// this; it lets phases without choices be passed.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `NotInitiator`, or `Transport`.
    #[instrument(skip(self))]
    pub async fn advance_phase(
        &self,
        session_id: &str,
        requester_id: &str,
    ) -> Result<(), CoordinationError> {
        let announcement = {
            let mut state = self.shared.state.write();
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
            ensure_initiator(session, requester_id)?;
            self.advance_locked(&mut state, session_id)?
        };
        self.announce(announcement).await
    }

    /// Cancels a session. Only the initiator may do this. No history is
    /// written.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `NotInitiator`, or `Transport`.
    #[instrument(skip(self))]
    pub async fn end_session(
        &self,
        session_id: &str,
        requester_id: &str,
    ) -> Result<(), CoordinationError> {
        let end = {
            let mut state = self.shared.state.write();
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
            ensure_initiator(session, requester_id)?;
            let end = cancellation(session, self.shared.clock.now());
            state.sessions.remove(session_id);
            end
        };

        info!("group event cancelled by initiator");
        self.broadcast(session_id, requester_id, MessageBody::End(end))
            .await
    }

    /// Sends an invite for an existing session to one peer.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPeer` if the peer is not valid (or not connected when
    /// no registry is configured), `SessionNotFound`, or `Transport`.
    #[instrument(skip(self))]
    pub async fn invite_peer(
        &self,
        session_id: &str,
        target_peer_id: &str,
    ) -> Result<(), CoordinationError> {
        let known = match &self.shared.registry {
            Some(registry) => registry.is_valid_peer(target_peer_id),
            None => self
                .shared
                .transport
                .connected_peers()
                .iter()
                .any(|p| p == target_peer_id),
        };
        if !known {
            return Err(CoordinationError::UnknownPeer(target_peer_id.to_owned()));
        }

        let (initiator_id, invite) = {
            let state = self.shared.state.read();
            let session = state
                .sessions
                .get(session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;
            (
                session.initiator_id().to_owned(),
                InvitePayload::for_template(session.template()),
            )
        };
        self.send_to(
            session_id,
            &initiator_id,
            MessageBody::Invite(invite),
            target_peer_id,
        )
        .await
    }

    /// Joins a remote session: mirrors it locally (if not already known)
    /// and runs the join path for the local peer.
    ///
    /// # Errors
    ///
    /// Returns `TemplateNotFound` if the local catalog lacks the template,
    /// any join error, or `Transport`.
    #[instrument(skip(self, invitation), fields(session_id = %invitation.session_id))]
    pub async fn accept_invitation(&self, invitation: &Invitation) -> Result<(), CoordinationError> {
        let template = self
            .shared
            .catalog
            .get(&invitation.template_id)
            .cloned()
            .ok_or_else(|| CoordinationError::TemplateNotFound(invitation.template_id.clone()))?;
        let local = self.local_peer_id();

        let roster = {
            let mut state = self.shared.state.write();
            let created = !state.sessions.contains(&invitation.session_id);
            if created {
                let mirror = Session::new(
                    invitation.session_id.clone(),
                    template,
                    &invitation.inviter_id,
                    self.clock(),
                )?;
                state.sessions.insert(mirror);
            }
            let session = state
                .sessions
                .get_mut(&invitation.session_id)
                .ok_or_else(|| CoordinationError::SessionNotFound(invitation.session_id.clone()))?;
            match session.add_participant(&local, self.clock()) {
                Ok(()) => roster_of(session),
                Err(e) => {
                    if created {
                        state.sessions.remove(&invitation.session_id);
                    }
                    return Err(e);
                }
            }
        };

        info!(inviter_id = %invitation.inviter_id, "group event invitation accepted");
        self.broadcast(&invitation.session_id, &local, MessageBody::Join(roster))
            .await
    }

    /// Applies a peer lifecycle event. Departing peers are removed from every
    /// session; sessions left empty are deleted.
    pub fn handle_peer_event(&self, event: PeerEvent, peer_id: &str) {
        match event {
            PeerEvent::Joined => info!(peer_id, "peer joined"),
            PeerEvent::CapabilitiesChanged => debug!(peer_id, "peer capabilities changed"),
            PeerEvent::Left | PeerEvent::Disconnected => {
                let departure = self
                    .shared
                    .state
                    .write()
                    .sessions
                    .remove_participant_everywhere(peer_id, self.clock());
                info!(
                    peer_id,
                    %event,
                    sessions_left = departure.left.len(),
                    sessions_removed = departure.removed.len(),
                    "peer departed"
                );
            }
        }
    }

    /// Removes idle sessions and force-advances overdue phases. Only the
    /// initiator's peer announces an expiry; mirrors drop the session
    /// silently. Broadcast failures are logged, not returned.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut outgoing = Vec::new();
        let local = self.local_peer_id();
        {
            let mut state = self.shared.state.write();
            let now = self.shared.clock.now();
            let idle_timeout = self.shared.config.idle_timeout;

            for session_id in state.sessions.ids_where(|s| s.is_idle(now, idle_timeout)) {
                if let Some(session) = state.sessions.remove(&session_id) {
                    if session.is_initiator(&local) {
                        outgoing.push(Announcement::Ended {
                            session_id: session_id.clone(),
                            sender: local.clone(),
                            payload: cancellation(&session, now),
                        });
                    }
                    report.expired.push(session_id);
                }
            }

            if self.shared.config.enforce_phase_deadlines {
                for session_id in state.sessions.ids_where(|s| s.phase_deadline_passed(now)) {
                    match self.advance_locked(&mut state, &session_id) {
                        Ok(announcement @ Announcement::Advanced { .. }) => {
                            report.advanced.push(session_id);
                            outgoing.push(announcement);
                        }
                        Ok(announcement @ Announcement::Ended { .. }) => {
                            report.completed.push(session_id);
                            outgoing.push(announcement);
                        }
                        Err(e) => warn!(session_id = %session_id, error = %e, "deadline advance failed"),
                    }
                }
            }
        }

        for announcement in outgoing {
            if let Err(e) = self.announce(announcement).await {
                warn!(error = %e, "sweep broadcast failed");
            }
        }
        if !report.is_empty() {
            info!(
                expired = report.expired.len(),
                advanced = report.advanced.len(),
                completed = report.completed.len(),
                "sweep finished"
            );
        }
        report
    }

    /// Advances `session_id` while the caller holds the store lock. On
    /// completion the session is removed and its history recorded.
    pub(crate) fn advance_locked(
        &self,
        state: &mut StoreState,
        session_id: &str,
    ) -> Result<Announcement, CoordinationError> {
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| CoordinationError::SessionNotFound(session_id.to_owned()))?;

        let sender = session.initiator_id().to_owned();
        match session.advance(self.clock()) {
            PhaseTransition::Advanced(phase) => {
                info!(session_id, phase = %phase, "group event advanced");
                let current = session.current_phase();
                Ok(Announcement::Advanced {
                    session_id: session_id.to_owned(),
                    sender,
                    payload: AdvancePayload {
                        new_phase: current.name.clone(),
                        phase_description: current.description.clone(),
                        choices: current.choices.clone(),
                        scores: session.scores().clone(),
                    },
                })
            }
            PhaseTransition::Completed => {
                let summary = session.completion_summary(self.shared.clock.now());
                state.sessions.remove(session_id);
                let written = state.history.append(&summary);
                info!(session_id, records = written, "group event completed");
                Ok(Announcement::Ended {
                    session_id: session_id.to_owned(),
                    sender,
                    payload: EndPayload {
                        final_scores: summary.final_scores,
                        duration: summary.duration_secs,
                        completed: true,
                    },
                })
            }
        }
    }

    pub(crate) async fn announce(&self, announcement: Announcement) -> Result<(), CoordinationError> {
        match announcement {
            Announcement::Advanced {
                session_id,
                sender,
                payload,
            } => {
                self.broadcast(&session_id, &sender, MessageBody::Advance(payload))
                    .await
            }
            Announcement::Ended {
                session_id,
                sender,
                payload,
            } => {
                self.broadcast(&session_id, &sender, MessageBody::End(payload))
                    .await
            }
        }
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.shared.clock.as_ref()
    }

    /// Wraps `body` in an envelope naming `sender`, the participant acting
    /// in this message (not necessarily the local peer).
    fn envelope(&self, session_id: &str, sender: &str, body: MessageBody) -> WireMessage {
        WireMessage {
            session_id: session_id.to_owned(),
            sender: sender.to_owned(),
            timestamp: self.shared.clock.now(),
            body,
        }
    }

    pub(crate) async fn broadcast(
        &self,
        session_id: &str,
        sender: &str,
        body: MessageBody,
    ) -> Result<(), CoordinationError> {
        let message = self.envelope(session_id, sender, body);
        self.shared
            .transport
            .broadcast(GROUP_EVENT_MESSAGE_TYPE, &message.encode())
            .await
            .map_err(|source| CoordinationError::Transport {
                message: message.kind().as_str(),
                source,
            })
    }

    pub(crate) async fn send_to(
        &self,
        session_id: &str,
        sender: &str,
        body: MessageBody,
        target_peer_id: &str,
    ) -> Result<(), CoordinationError> {
        let message = self.envelope(session_id, sender, body);
        self.shared
            .transport
            .send(GROUP_EVENT_MESSAGE_TYPE, &message.encode(), target_peer_id)
            .await
            .map_err(|source| CoordinationError::Transport {
                message: message.kind().as_str(),
                source,
            })
    }

    fn allocate_session_id(&self, state: &StoreState) -> Result<String, CoordinationError> {
        let mut rng = self.shared.rng.lock();
        for _ in 0..SESSION_ID_ATTEMPTS {
            let mut bytes = [0u8; 16];
            for chunk in bytes.chunks_exact_mut(4) {
                chunk.copy_from_slice(&rng.next_u32_range(0, u32::MAX).to_be_bytes());
            }
            let session_id = format!("group_{}", Builder::from_random_bytes(bytes).into_uuid().simple());
            if !state.sessions.contains(&session_id) {
                return Ok(session_id);
            }
        }
        Err(CoordinationError::Internal(
            "could not allocate a unique session id".to_owned(),
        ))
    }
}

pub(crate) fn roster_of(session: &Session) -> JoinPayload {
    JoinPayload {
        participant_count: session.participants().len(),
        participants: session.participants().to_vec(),
    }
}

fn cancellation(session: &Session, now: chrono::DateTime<chrono::Utc>) -> EndPayload {
    EndPayload {
        final_scores: session.scores().clone(),
        duration: session.duration_secs(now),
        completed: false,
    }
}

fn ensure_initiator(session: &Session, requester_id: &str) -> Result<(), CoordinationError> {
    if session.is_initiator(requester_id) {
        Ok(())
    } else {
        Err(CoordinationError::NotInitiator {
            session_id: session.session_id().to_owned(),
            initiator_id: session.initiator_id().to_owned(),
        })
    }
}
