//! Per-phase point settlement.

use std::collections::BTreeMap;

use troupe_catalog::Phase;

use super::tally::VoteTally;

/// Adds the points of each voter's choice to their cumulative score and
/// returns the per-participant deltas. Participants without a vote are left
/// unchanged. Scores are not clamped.
pub fn settle_phase(
    phase: &Phase,
    tally: &VoteTally,
    scores: &mut BTreeMap<String, i64>,
) -> BTreeMap<String, i64> {
    let mut deltas = BTreeMap::new();
    for (participant_id, choice_id) in tally.votes() {
        let points = phase.choice(choice_id).map_or(0, |choice| choice.points);
        *scores.entry(participant_id.clone()).or_insert(0) += points;
        deltas.insert(participant_id.clone(), points);
    }
    deltas
}
