//! In-memory session store.

use std::collections::HashMap;

use serde::Serialize;
use troupe_core::clock::Clock;

use crate::domain::history::HistoryRecorder;
use crate::domain::session::Session;

/// Active sessions keyed by session ID.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<String, Session>,
}

impl SessionStore {
    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.session_id().to_owned(), session);
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(session_id)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id)
    }

    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// IDs of sessions matching `predicate`.
    pub fn ids_where(&self, predicate: impl Fn(&Session) -> bool) -> Vec<String> {
        self.sessions
            .values()
            .filter(|s| predicate(s))
            .map(|s| s.session_id().to_owned())
            .collect()
    }

    /// Removes `participant_id` from every session and drops sessions left
    /// without participants.
    pub fn remove_participant_everywhere(
        &mut self,
        participant_id: &str,
        clock: &dyn Clock,
    ) -> PeerDeparture {
        let mut departure = PeerDeparture::default();
        for session in self.sessions.values_mut() {
            if session.remove_participant(participant_id, clock) {
                departure.left.push(session.session_id().to_owned());
            }
        }
        self.sessions.retain(|session_id, session| {
            if session.participants().is_empty() {
                departure.removed.push(session_id.clone());
                false
            } else {
                true
            }
        });
        departure
    }
}

/// Sessions affected by a peer leaving.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PeerDeparture {
    /// Sessions the peer was removed from.
    pub left: Vec<String>,
    /// Sessions deleted because nobody was left.
    pub removed: Vec<String>,
}

/// Everything guarded by the coordinator's store lock.
#[derive(Debug, Default)]
pub struct StoreState {
    pub sessions: SessionStore,
    pub history: HistoryRecorder,
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Sessions removed for inactivity.
    pub expired: Vec<String>,
    /// Sessions whose overdue phase was force-advanced.
    pub advanced: Vec<String>,
    /// Sessions that completed because their overdue phase was the last.
    pub completed: Vec<String>,
}

impl SweepReport {
    /// Returns `true` if the sweep changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty() && self.advanced.is_empty() && self.completed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use troupe_catalog::TemplateCatalog;
    use troupe_test_support::FixedClock;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn session(id: &str, initiator: &str) -> Session {
        let template = TemplateCatalog::builtin().unwrap().get("campfire").unwrap().clone();
        Session::new(id.to_owned(), template, initiator, &clock()).unwrap()
    }

    #[test]
    fn test_departure_shrinks_then_removes_sessions() {
        // Arrange
        let clock = clock();
        let mut store = SessionStore::default();
        let mut shared = session("group_1", "p1");
        shared.add_participant("p2", &clock).unwrap();
        store.insert(shared);
        store.insert(session("group_2", "p2"));
        store.insert(session("group_3", "p3"));

        // Act
        let departure = store.remove_participant_everywhere("p2", &clock);

        // Assert
        let mut left = departure.left.clone();
        left.sort();
        assert_eq!(left, ["group_1".to_owned(), "group_2".to_owned()]);
        assert_eq!(departure.removed, ["group_2".to_owned()]);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("group_1").unwrap().participants(), ["p1".to_owned()]);

        let departure = store.remove_participant_everywhere("p1", &clock);
        assert_eq!(departure.removed, ["group_1".to_owned()]);
        assert!(!store.contains("group_1"));
        assert!(store.contains("group_3"));
    }

    #[test]
    fn test_ids_where_filters_sessions() {
        let mut store = SessionStore::default();
        store.insert(session("group_1", "p1"));
        store.insert(session("group_2", "p2"));

        let ids = store.ids_where(|s| s.is_initiator("p2"));

        assert_eq!(ids, ["group_2".to_owned()]);
    }

    #[test]
    fn test_empty_sweep_report() {
        assert!(SweepReport::default().is_empty());
        let report = SweepReport {
            expired: vec!["group_1".to_owned()],
            ..SweepReport::default()
        };
        assert!(!report.is_empty());
    }
}
