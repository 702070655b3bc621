//! Peer registry abstraction.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoordinationError;

/// A change in a remote peer's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerEvent {
    /// The peer connected.
    Joined,
    /// The peer left cleanly.
    Left,
    /// The peer dropped without saying goodbye.
    Disconnected,
    /// The peer advertised a new capability set.
    CapabilitiesChanged,
}

impl PeerEvent {
    /// Returns `true` if the peer is gone after this event.
    #[must_use]
    pub fn is_departure(self) -> bool {
        matches!(self, Self::Left | Self::Disconnected)
    }
}

impl fmt::Display for PeerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Joined => "peer_joined",
            Self::Left => "peer_left",
            Self::Disconnected => "peer_disconnected",
            Self::CapabilitiesChanged => "peer_capabilities_changed",
        };
        f.write_str(name)
    }
}

/// Information about a known peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer identifier.
    pub id: String,
    /// Optional display name.
    pub nickname: Option<String>,
    /// Advertised capabilities, e.g. `group_events`.
    pub capabilities: Vec<String>,
    /// Last time the peer was seen.
    pub last_seen: DateTime<Utc>,
}

/// Callback invoked on every peer state change.
pub type PeerEventCallback = Arc<dyn Fn(PeerEvent, &str) + Send + Sync>;

/// Source of peer identity and peer lifecycle events.
pub trait PeerRegistry: Send + Sync {
    /// Look up a peer.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError::UnknownPeer` if the peer is not known.
    fn peer_info(&self, peer_id: &str) -> Result<PeerInfo, CoordinationError>;

    /// Returns `true` if the peer is known and trusted.
    fn is_valid_peer(&self, peer_id: &str) -> bool;

    /// Subscribe to peer lifecycle events.
    fn on_peer_event(&self, callback: PeerEventCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_departure_events() {
        assert!(PeerEvent::Left.is_departure());
        assert!(PeerEvent::Disconnected.is_departure());
        assert!(!PeerEvent::Joined.is_departure());
        assert!(!PeerEvent::CapabilitiesChanged.is_departure());
    }

    #[test]
    fn test_display_uses_wire_names() {
        assert_eq!(PeerEvent::Left.to_string(), "peer_left");
        assert_eq!(
            PeerEvent::CapabilitiesChanged.to_string(),
            "peer_capabilities_changed"
        );
    }
}
