//! The session aggregate and its phase state machine.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use troupe_catalog::{Phase, Template};
use troupe_core::clock::Clock;
use troupe_core::error::CoordinationError;

use super::history::CompletionSummary;
use super::scoring::settle_phase;
use super::tally::VoteTally;

/// Result of recording a vote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteOutcome {
    /// Distinct voters in the current phase.
    pub total_votes: usize,
    /// Whether the advance rule is now satisfied.
    pub can_advance: bool,
    /// Choice ID to vote count.
    pub counts: BTreeMap<String, u32>,
}

/// What [`Session::advance`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseTransition {
    /// The session moved to the named phase.
    Advanced(String),
    /// The last phase finished.
    Completed,
}

/// One live group event.
///
/// The current phase is stored as an index into the template snapshot, so it
/// always names exactly one template phase.
#[derive(Debug, Clone)]
pub struct Session {
    session_id: String,
    template: Template,
    participants: Vec<String>,
    initiator_id: String,
    phase_index: usize,
    phase_data: BTreeMap<String, Value>,
    started_at: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    phase_started_at: DateTime<Utc>,
    tally: VoteTally,
    scores: BTreeMap<String, i64>,
    completed_phases: Vec<String>,
}

impl Session {
    /// Creates a session in the template's first phase with the initiator as
    /// its only participant.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::InvalidPhase` if the template has no
    /// phases.
    pub fn new(
        session_id: String,
        template: Template,
        initiator_id: &str,
        clock: &dyn Clock,
    ) -> Result<Self, CoordinationError> {
        if template.phases.is_empty() {
            return Err(CoordinationError::InvalidPhase(format!(
                "template {} has no phases",
                template.id
            )));
        }
        let now = clock.now();
        Ok(Self {
            session_id,
            template,
            participants: vec![initiator_id.to_owned()],
            initiator_id: initiator_id.to_owned(),
            phase_index: 0,
            phase_data: BTreeMap::new(),
            started_at: now,
            last_activity: now,
            phase_started_at: now,
            tally: VoteTally::default(),
            scores: BTreeMap::from([(initiator_id.to_owned(), 0)]),
            completed_phases: Vec::new(),
        })
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn template(&self) -> &Template {
        &self.template
    }

    #[must_use]
    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    #[must_use]
    pub fn initiator_id(&self) -> &str {
        &self.initiator_id
    }

    /// The phase the session is in.
    #[must_use]
    pub fn current_phase(&self) -> &Phase {
        &self.template.phases[self.phase_index]
    }

    #[must_use]
    pub fn phase_index(&self) -> usize {
        self.phase_index
    }

    /// Results of the previous phase: `previousPhase`, `winningChoice` and
    /// `totalVotes`. Empty in the first phase.
    #[must_use]
    pub fn phase_data(&self) -> &BTreeMap<String, Value> {
        &self.phase_data
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    #[must_use]
    pub fn phase_started_at(&self) -> DateTime<Utc> {
        self.phase_started_at
    }

    #[must_use]
    pub fn tally(&self) -> &VoteTally {
        &self.tally
    }

    /// Cumulative participant scores.
    #[must_use]
    pub fn scores(&self) -> &BTreeMap<String, i64> {
        &self.scores
    }

    #[must_use]
    pub fn completed_phases(&self) -> &[String] {
        &self.completed_phases
    }

    #[must_use]
    pub fn is_participant(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p == participant_id)
    }

    #[must_use]
    pub fn is_initiator(&self, participant_id: &str) -> bool {
        self.initiator_id == participant_id
    }

    /// Marks the session as active now.
    pub fn touch(&mut self, clock: &dyn Clock) {
        self.last_activity = clock.now();
    }

    /// Adds a participant.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyParticipant` for a duplicate and `SessionFull` once the
    /// template's maximum is reached.
    pub fn add_participant(
        &mut self,
        participant_id: &str,
        clock: &dyn Clock,
    ) -> Result<(), CoordinationError> {
        if self.is_participant(participant_id) {
            return Err(CoordinationError::AlreadyParticipant {
                session_id: self.session_id.clone(),
                participant_id: participant_id.to_owned(),
            });
        }
        if self.participants.len() >= self.template.max_participants {
            return Err(CoordinationError::SessionFull {
                session_id: self.session_id.clone(),
                max: self.template.max_participants,
            });
        }
        self.participants.push(participant_id.to_owned());
        self.scores.entry(participant_id.to_owned()).or_insert(0);
        self.touch(clock);
        Ok(())
    }

    /// Adds every unknown participant in `roster` while there is room.
    /// Returns the participants that were added.
    pub fn merge_participants(&mut self, roster: &[String], clock: &dyn Clock) -> Vec<String> {
        let mut added = Vec::new();
        for participant_id in roster {
            if self.is_participant(participant_id) {
                continue;
            }
            if self.add_participant(participant_id, clock).is_err() {
                break;
            }
            added.push(participant_id.clone());
        }
        added
    }

    /// Removes a participant along with their vote and score. Returns `false`
    /// if they were not participating.
    pub fn remove_participant(&mut self, participant_id: &str, clock: &dyn Clock) -> bool {
        let before = self.participants.len();
        self.participants.retain(|p| p != participant_id);
        if self.participants.len() == before {
            return false;
        }
        self.tally.withdraw(participant_id);
        self.scores.remove(participant_id);
        self.touch(clock);
        true
    }

    /// Records a vote in the current phase and evaluates the advance rule.
    /// Does not advance.
    ///
    /// # Errors
    ///
    /// Returns `NotAParticipant` for outsiders and `InvalidChoice` if the
    /// current phase does not offer `choice_id`.
    pub fn record_vote(
        &mut self,
        participant_id: &str,
        choice_id: &str,
        clock: &dyn Clock,
    ) -> Result<VoteOutcome, CoordinationError> {
        if !self.is_participant(participant_id) {
            return Err(CoordinationError::NotAParticipant {
                session_id: self.session_id.clone(),
                participant_id: participant_id.to_owned(),
            });
        }
        if self.current_phase().choice(choice_id).is_none() {
            return Err(CoordinationError::InvalidChoice(format!(
                "{choice_id} is not offered in phase {}",
                self.current_phase().name
            )));
        }
        let total_votes = self.tally.record(participant_id, choice_id);
        self.touch(clock);
        Ok(VoteOutcome {
            total_votes,
            can_advance: self.advance_ready(),
            counts: self.tally.counts().clone(),
        })
    }

    /// Whether the current phase has enough votes to advance.
    #[must_use]
    pub fn advance_ready(&self) -> bool {
        let phase = self.current_phase();
        let distinct = self.tally.distinct_voters();
        distinct >= phase.min_votes
            || (phase.auto_advance && distinct == self.participants.len())
    }

    /// Settles the current phase's points and moves to the next phase, or
    /// reports completion if this was the last one.
    pub fn advance(&mut self, clock: &dyn Clock) -> PhaseTransition {
        let finished = &self.template.phases[self.phase_index];
        settle_phase(finished, &self.tally, &mut self.scores);
        self.phase_data = phase_results(finished, &self.tally);
        self.completed_phases.push(finished.name.clone());
        self.tally.clear();
        self.touch(clock);

        if self.template.is_last_phase(self.phase_index) {
            return PhaseTransition::Completed;
        }
        self.phase_index += 1;
        self.phase_started_at = self.last_activity;
        PhaseTransition::Advanced(self.current_phase().name.clone())
    }

    /// Applies a phase transition announced by another peer, adopting its
    /// cumulative scores. Returns `false` if the announcement is stale (the
    /// named phase is not ahead of the current one). Phases skipped over are
    /// marked completed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPhase` if the template has no phase named `new_phase`.
    pub fn apply_remote_advance(
        &mut self,
        new_phase: &str,
        scores: &BTreeMap<String, i64>,
        clock: &dyn Clock,
    ) -> Result<bool, CoordinationError> {
        let target = self
            .template
            .phase_index(new_phase)
            .ok_or_else(|| CoordinationError::InvalidPhase(new_phase.to_owned()))?;
        if target <= self.phase_index {
            return Ok(false);
        }

        let finished = &self.template.phases[target - 1];
        self.phase_data = if target - 1 == self.phase_index {
            phase_results(finished, &self.tally)
        } else {
            phase_results(finished, &VoteTally::default())
        };
        for phase in &self.template.phases[self.phase_index..target] {
            self.completed_phases.push(phase.name.clone());
        }
        self.tally.clear();
        self.scores.clone_from(scores);
        for participant_id in &self.participants {
            self.scores.entry(participant_id.clone()).or_insert(0);
        }
        self.phase_index = target;
        self.touch(clock);
        self.phase_started_at = self.last_activity;
        Ok(true)
    }

    /// Whether the session has seen no activity for at least `timeout`.
    #[must_use]
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .is_ok_and(|idle| idle >= timeout)
    }

    /// Whether the current phase has run past its maximum duration. Always
    /// `false` for phases without a deadline.
    #[must_use]
    pub fn phase_deadline_passed(&self, now: DateTime<Utc>) -> bool {
        let Some(max) = self.current_phase().max_duration() else {
            return false;
        };
        (now - self.phase_started_at)
            .to_std()
            .is_ok_and(|elapsed| elapsed >= max)
    }

    /// Whole seconds since the session started.
    #[must_use]
    pub fn duration_secs(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at)
            .to_std()
            .map_or(0, |elapsed| elapsed.as_secs())
    }

    /// Snapshot used to write history records.
    #[must_use]
    pub fn completion_summary(&self, completed_at: DateTime<Utc>) -> CompletionSummary {
        CompletionSummary {
            session_id: self.session_id.clone(),
            template_id: self.template.id.clone(),
            participants: self.participants.clone(),
            completed_at,
            duration_secs: self.duration_secs(completed_at),
            final_scores: self.scores.clone(),
        }
    }
}

fn phase_results(phase: &Phase, tally: &VoteTally) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("previousPhase".to_owned(), json!(phase.name)),
        ("winningChoice".to_owned(), json!(tally.leading_choice(phase))),
        ("totalVotes".to_owned(), json!(tally.distinct_voters())),
    ])
}
