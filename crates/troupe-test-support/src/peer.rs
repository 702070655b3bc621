//! Mock peer registry.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use troupe_core::error::CoordinationError;
use troupe_core::peer::{PeerEvent, PeerEventCallback, PeerInfo, PeerRegistry};

/// A peer registry backed by an in-memory map. Events are only emitted when
/// the test calls [`MockPeerRegistry::trigger`].
#[derive(Default)]
pub struct MockPeerRegistry {
    peers: Mutex<HashMap<String, PeerInfo>>,
    callbacks: Mutex<Vec<PeerEventCallback>>,
}

impl MockPeerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a valid peer.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn add_peer(&self, peer_id: &str, nickname: Option<&str>) {
        let info = PeerInfo {
            id: peer_id.to_owned(),
            nickname: nickname.map(str::to_owned),
            capabilities: vec!["group_events".to_owned()],
            last_seen: DateTime::<Utc>::UNIX_EPOCH,
        };
        self.peers.lock().unwrap().insert(peer_id.to_owned(), info);
    }

    /// Forget a peer.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn remove_peer(&self, peer_id: &str) {
        self.peers.lock().unwrap().remove(peer_id);
    }

    /// Deliver `event` for `peer_id` to every subscriber.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn trigger(&self, event: PeerEvent, peer_id: &str) {
        let callbacks = self.callbacks.lock().unwrap().clone();
        for callback in callbacks {
            callback(event, peer_id);
        }
    }

    /// Number of subscribed callbacks.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }
}

impl PeerRegistry for MockPeerRegistry {
    fn peer_info(&self, peer_id: &str) -> Result<PeerInfo, CoordinationError> {
        self.peers
            .lock()
            .unwrap()
            .get(peer_id)
            .cloned()
            .ok_or_else(|| CoordinationError::UnknownPeer(peer_id.to_owned()))
    }

    fn is_valid_peer(&self, peer_id: &str) -> bool {
        self.peers.lock().unwrap().contains_key(peer_id)
    }

    fn on_peer_event(&self, callback: PeerEventCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }
}
