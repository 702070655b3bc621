//! Current-phase vote accumulator.

use std::collections::BTreeMap;

use troupe_catalog::Phase;

/// Votes cast in the current phase. A participant holds at most one vote;
/// voting again moves it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoteTally {
    counts: BTreeMap<String, u32>,
    by_participant: BTreeMap<String, String>,
}

impl VoteTally {
    /// Records `participant_id`'s vote for `choice_id`, replacing any earlier
    /// vote in this phase. Returns the number of distinct voters.
    pub fn record(&mut self, participant_id: &str, choice_id: &str) -> usize {
        if let Some(previous) = self
            .by_participant
            .insert(participant_id.to_owned(), choice_id.to_owned())
        {
            self.decrement(&previous);
        }
        *self.counts.entry(choice_id.to_owned()).or_insert(0) += 1;
        self.by_participant.len()
    }

    /// Removes `participant_id`'s vote, if any.
    pub fn withdraw(&mut self, participant_id: &str) -> bool {
        match self.by_participant.remove(participant_id) {
            Some(previous) => {
                self.decrement(&previous);
                true
            }
            None => false,
        }
    }

    fn decrement(&mut self, choice_id: &str) {
        if let Some(count) = self.counts.get_mut(choice_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.counts.remove(choice_id);
            }
        }
    }

    /// Number of participants holding a vote.
    #[must_use]
    pub fn distinct_voters(&self) -> usize {
        self.by_participant.len()
    }

    /// Votes currently counted for `choice_id`.
    #[must_use]
    pub fn count(&self, choice_id: &str) -> u32 {
        self.counts.get(choice_id).copied().unwrap_or(0)
    }

    /// Choice ID to vote count, for choices with at least one vote.
    #[must_use]
    pub fn counts(&self) -> &BTreeMap<String, u32> {
        &self.counts
    }

    /// Participant ID to chosen choice ID.
    #[must_use]
    pub fn votes(&self) -> &BTreeMap<String, String> {
        &self.by_participant
    }

    /// The choice `participant_id` currently votes for.
    #[must_use]
    pub fn vote_of(&self, participant_id: &str) -> Option<&str> {
        self.by_participant.get(participant_id).map(String::as_str)
    }

    /// The choice with the most votes. Ties go to the choice declared first
    /// in `phase`.
    #[must_use]
    pub fn leading_choice<'a>(&self, phase: &'a Phase) -> Option<&'a str> {
        let mut leader: Option<(&'a str, u32)> = None;
        for choice in &phase.choices {
            let count = self.count(&choice.id);
            if count > 0 && leader.is_none_or(|(_, best)| count > best) {
                leader = Some((choice.id.as_str(), count));
            }
        }
        leader.map(|(id, _)| id)
    }

    /// Returns `true` if nobody has voted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_participant.is_empty()
    }

    /// Forgets every vote.
    pub fn clear(&mut self) {
        self.counts.clear();
        self.by_participant.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use troupe_catalog::{Choice, PhaseKind};

    fn phase() -> Phase {
        Phase {
            name: "choose".to_owned(),
            description: String::new(),
            kind: PhaseKind::Vote,
            max_duration_secs: 0,
            choices: ["a", "b", "c"]
                .into_iter()
                .map(|id| Choice {
                    id: id.to_owned(),
                    text: id.to_owned(),
                    description: None,
                    points: 1,
                })
                .collect(),
            min_votes: 2,
            auto_advance: false,
        }
    }

    #[test]
    fn test_record_counts_distinct_voters() {
        let mut tally = VoteTally::default();

        assert_eq!(tally.record("p1", "a"), 1);
        assert_eq!(tally.record("p2", "a"), 2);

        assert_eq!(tally.count("a"), 2);
        assert_eq!(tally.distinct_voters(), 2);
    }

    #[test]
    fn test_revote_moves_the_vote() {
        // Arrange
        let mut tally = VoteTally::default();
        tally.record("p1", "a");

        // Act
        let distinct = tally.record("p1", "b");

        // Assert
        assert_eq!(distinct, 1);
        assert_eq!(tally.count("a"), 0);
        assert_eq!(tally.count("b"), 1);
        assert!(!tally.counts().contains_key("a"));
        assert_eq!(tally.vote_of("p1"), Some("b"));
    }

    #[test]
    fn test_revote_same_choice_counts_once() {
        let mut tally = VoteTally::default();
        tally.record("p1", "a");
        tally.record("p1", "a");

        assert_eq!(tally.count("a"), 1);
    }

    #[test]
    fn test_withdraw_removes_vote() {
        let mut tally = VoteTally::default();
        tally.record("p1", "a");
        tally.record("p2", "b");

        assert!(tally.withdraw("p1"));
        assert!(!tally.withdraw("p1"));

        assert_eq!(tally.count("a"), 0);
        assert_eq!(tally.distinct_voters(), 1);
    }

    #[test]
    fn test_leading_choice_breaks_ties_by_declaration_order() {
        let phase = phase();
        let mut tally = VoteTally::default();
        assert_eq!(tally.leading_choice(&phase), None);

        tally.record("p1", "c");
        tally.record("p2", "b");
        assert_eq!(tally.leading_choice(&phase), Some("b"));

        tally.record("p3", "c");
        assert_eq!(tally.leading_choice(&phase), Some("c"));
    }

    #[test]
    fn test_clear_empties_tally() {
        let mut tally = VoteTally::default();
        tally.record("p1", "a");

        tally.clear();

        assert!(tally.is_empty());
        assert!(tally.counts().is_empty());
    }
}
