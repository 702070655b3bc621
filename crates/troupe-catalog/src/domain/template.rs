//! Template, phase and choice definitions.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broad category of a group event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateCategory {
    /// A collaborative story or situation.
    Scenario,
    /// A short competitive game.
    MiniGame,
    /// A group decision.
    Decision,
}

/// What a phase is for. Informational; every phase follows the same voting
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseKind {
    /// Opening narration.
    Intro,
    /// Each participant picks an option.
    Choice,
    /// The group votes on an option.
    Vote,
    /// Outcome presentation.
    Result,
    /// An embedded mini-game round.
    MiniGame,
}

/// One option offered in a phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    /// Identifier, unique within its phase.
    pub id: String,
    /// Display text.
    pub text: String,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Points awarded to each participant who picked this choice.
    #[serde(default)]
    pub points: i64,
}

/// One ordered stage of a group event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    /// Name, unique within its template.
    pub name: String,
    /// Description shown to participants.
    #[serde(default)]
    pub description: String,
    /// Phase type tag.
    #[serde(rename = "type")]
    pub kind: PhaseKind,
    /// Maximum phase duration in seconds; zero means no deadline.
    #[serde(default)]
    pub max_duration_secs: u64,
    /// Options available in this phase.
    #[serde(default)]
    pub choices: Vec<Choice>,
    /// Distinct voters needed before the phase advances.
    #[serde(default)]
    pub min_votes: usize,
    /// Advance as soon as every participant has voted.
    #[serde(default)]
    pub auto_advance: bool,
}

impl Phase {
    /// Looks up a choice by ID.
    #[must_use]
    pub fn choice(&self, choice_id: &str) -> Option<&Choice> {
        self.choices.iter().find(|c| c.id == choice_id)
    }

    /// Returns the phase deadline, or `None` if the phase has no deadline.
    #[must_use]
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }

    /// Position of a choice in declaration order.
    #[must_use]
    pub fn choice_position(&self, choice_id: &str) -> Option<usize> {
        self.choices.iter().position(|c| c.id == choice_id)
    }
}

/// The static, reusable definition of a group event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Template identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Description shown in invitations.
    #[serde(default)]
    pub description: String,
    /// Category tag.
    pub category: TemplateCategory,
    /// Minimum participants (including the initiator) needed to start.
    pub min_participants: usize,
    /// Maximum participants.
    pub max_participants: usize,
    /// Expected duration in seconds.
    #[serde(default)]
    pub estimated_time_secs: u64,
    /// Ordered phases.
    pub phases: Vec<Phase>,
    /// Free-form extra data.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Template {
    /// Returns the expected duration.
    #[must_use]
    pub fn estimated_time(&self) -> Duration {
        Duration::from_secs(self.estimated_time_secs)
    }

    /// Returns the phase at `index`.
    #[must_use]
    pub fn phase_at(&self, index: usize) -> Option<&Phase> {
        self.phases.get(index)
    }

    /// Looks up a phase by name.
    #[must_use]
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Position of a phase in template order.
    #[must_use]
    pub fn phase_index(&self, name: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == name)
    }

    /// Returns `true` if `index` is the final phase.
    #[must_use]
    pub fn is_last_phase(&self, index: usize) -> bool {
        index + 1 >= self.phases.len()
    }
}
