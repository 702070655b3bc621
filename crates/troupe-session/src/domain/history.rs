//! Per-participant history of completed sessions.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One participant's record of a completed session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedRecord {
    /// The completed session.
    pub session_id: String,
    /// The template it ran.
    pub template_id: String,
    /// Everyone who participated at completion.
    pub participants: Vec<String>,
    /// When the session completed.
    pub completed_at: DateTime<Utc>,
    /// This participant's cumulative score.
    pub final_score: i64,
    /// Session duration in whole seconds.
    pub duration_secs: u64,
}

impl CompletedRecord {
    /// Session duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Everything needed to write the history records of one completed session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSummary {
    pub session_id: String,
    pub template_id: String,
    pub participants: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub final_scores: BTreeMap<String, i64>,
}

/// Append-only log of completed sessions, keyed by participant.
#[derive(Debug, Default)]
pub struct HistoryRecorder {
    records: HashMap<String, Vec<CompletedRecord>>,
}

impl HistoryRecorder {
    /// Appends one record per participant. A participant who already has a
    /// record for the session is skipped. Returns the number of records
    /// written.
    pub fn append(&mut self, summary: &CompletionSummary) -> usize {
        let mut written = 0;
        for participant_id in &summary.participants {
            let history = self.records.entry(participant_id.clone()).or_default();
            if history.iter().any(|r| r.session_id == summary.session_id) {
                continue;
            }
            history.push(CompletedRecord {
                session_id: summary.session_id.clone(),
                template_id: summary.template_id.clone(),
                participants: summary.participants.clone(),
                completed_at: summary.completed_at,
                final_score: summary.final_scores.get(participant_id).copied().unwrap_or(0),
                duration_secs: summary.duration_secs,
            });
            written += 1;
        }
        written
    }

    /// Returns `participant_id`'s records, oldest first. Empty when the
    /// participant has never completed a session.
    #[must_use]
    pub fn history(&self, participant_id: &str) -> Vec<CompletedRecord> {
        self.records.get(participant_id).cloned().unwrap_or_default()
    }

    /// Total number of records across all participants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
