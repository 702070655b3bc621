//! Local bus and per-peer endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};
use troupe_core::clock::{Clock, SystemClock};
use troupe_core::error::{CoordinationError, TransportError};
use troupe_core::peer::{PeerEvent, PeerEventCallback, PeerInfo, PeerRegistry};
use troupe_core::transport::{MessageHandler, Transport};

const CAPABILITIES: &[&str] = &["group_events"];

struct PeerSlot {
    id: String,
    nickname: Option<String>,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    listeners: Vec<PeerEventCallback>,
}

/// An in-process network of peers.
pub struct LocalBus {
    peers: RwLock<Vec<PeerSlot>>,
    clock: Arc<dyn Clock>,
}

impl LocalBus {
    /// Creates an empty bus using the system clock.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty bus that stamps peer info with `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            peers: RwLock::new(Vec::new()),
            clock,
        })
    }

    /// Connects a peer and announces it to the others.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Other` if a peer with this ID is already
    /// connected.
    pub fn connect(
        self: &Arc<Self>,
        peer_id: &str,
        nickname: Option<&str>,
    ) -> Result<BusEndpoint, TransportError> {
        {
            let mut peers = self.peers.write();
            if peers.iter().any(|p| p.id == peer_id) {
                return Err(TransportError::Other(format!(
                    "peer already connected: {peer_id}"
                )));
            }
            peers.push(PeerSlot {
                id: peer_id.to_owned(),
                nickname: nickname.map(str::to_owned),
                handlers: HashMap::new(),
                listeners: Vec::new(),
            });
        }
        info!(peer_id, "peer connected to bus");
        self.notify(PeerEvent::Joined, peer_id);
        Ok(BusEndpoint {
            bus: Arc::clone(self),
            peer_id: peer_id.to_owned(),
        })
    }

    /// Removes a peer that left cleanly. Returns `false` if it was not
    /// connected.
    pub fn disconnect(&self, peer_id: &str) -> bool {
        self.remove(peer_id, PeerEvent::Left)
    }

    /// Removes a peer that dropped without saying goodbye.
    pub fn drop_peer(&self, peer_id: &str) -> bool {
        self.remove(peer_id, PeerEvent::Disconnected)
    }

    /// IDs of connected peers in connection order.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<String> {
        self.peers.read().iter().map(|p| p.id.clone()).collect()
    }

    /// Returns `true` if `peer_id` is connected.
    #[must_use]
    pub fn is_connected(&self, peer_id: &str) -> bool {
        self.peers.read().iter().any(|p| p.id == peer_id)
    }

    fn remove(&self, peer_id: &str, event: PeerEvent) -> bool {
        let removed = {
            let mut peers = self.peers.write();
            let before = peers.len();
            peers.retain(|p| p.id != peer_id);
            peers.len() != before
        };
        if removed {
            info!(peer_id, %event, "peer removed from bus");
            self.notify(event, peer_id);
        }
        removed
    }

    /// Calls every other peer's listeners. Runs without holding the bus lock.
    fn notify(&self, event: PeerEvent, peer_id: &str) {
        let listeners: Vec<PeerEventCallback> = self
            .peers
            .read()
            .iter()
            .filter(|p| p.id != peer_id)
            .flat_map(|p| p.listeners.iter().cloned())
            .collect();
        for listener in listeners {
            listener(event, peer_id);
        }
    }

    fn handler_of(&self, peer_id: &str, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.peers
            .read()
            .iter()
            .find(|p| p.id == peer_id)
            .and_then(|p| p.handlers.get(message_type).cloned())
    }
}

async fn dispatch(
    handler: Arc<dyn MessageHandler>,
    message_type: &str,
    payload: &[u8],
    from: &str,
    to: &str,
) {
    if let Err(e) = handler.handle(payload, from).await {
        warn!(message_type, from, to, error = %e, "message handler failed");
    }
}

/// One peer's view of a [`LocalBus`].
pub struct BusEndpoint {
    bus: Arc<LocalBus>,
    peer_id: String,
}

impl BusEndpoint {
    /// The bus this endpoint is attached to.
    #[must_use]
    pub fn bus(&self) -> &Arc<LocalBus> {
        &self.bus
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.bus.is_connected(&self.peer_id) {
            Ok(())
        } else {
            Err(TransportError::Closed)
        }
    }
}

#[async_trait]
impl Transport for BusEndpoint {
    async fn send(
        &self,
        message_type: &str,
        payload: &[u8],
        target_peer_id: &str,
    ) -> Result<(), TransportError> {
        self.ensure_connected()?;
        if !self.bus.is_connected(target_peer_id) {
            return Err(TransportError::PeerUnreachable(target_peer_id.to_owned()));
        }
        match self.bus.handler_of(target_peer_id, message_type) {
            Some(handler) => {
                dispatch(handler, message_type, payload, &self.peer_id, target_peer_id).await;
            }
            None => debug!(message_type, target_peer_id, "no handler registered; message dropped"),
        }
        Ok(())
    }

    async fn broadcast(&self, message_type: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let targets: Vec<(String, Arc<dyn MessageHandler>)> = self
            .bus
            .peers
            .read()
            .iter()
            .filter(|p| p.id != self.peer_id)
            .filter_map(|p| {
                p.handlers
                    .get(message_type)
                    .map(|h| (p.id.clone(), Arc::clone(h)))
            })
            .collect();
        for (target, handler) in targets {
            dispatch(handler, message_type, payload, &self.peer_id, &target).await;
        }
        Ok(())
    }

    fn register_handler(&self, message_type: &str, handler: Arc<dyn MessageHandler>) {
        let mut peers = self.bus.peers.write();
        if let Some(slot) = peers.iter_mut().find(|p| p.id == self.peer_id) {
            slot.handlers.insert(message_type.to_owned(), handler);
        }
    }

    fn connected_peers(&self) -> Vec<String> {
        self.bus
            .peers
            .read()
            .iter()
            .filter(|p| p.id != self.peer_id)
            .map(|p| p.id.clone())
            .collect()
    }

    fn local_peer_id(&self) -> String {
        self.peer_id.clone()
    }
}

impl PeerRegistry for BusEndpoint {
    fn peer_info(&self, peer_id: &str) -> Result<PeerInfo, CoordinationError> {
        let peers = self.bus.peers.read();
        let slot = peers
            .iter()
            .find(|p| p.id == peer_id)
            .ok_or_else(|| CoordinationError::UnknownPeer(peer_id.to_owned()))?;
        Ok(PeerInfo {
            id: slot.id.clone(),
            nickname: slot.nickname.clone(),
            capabilities: CAPABILITIES.iter().map(|c| (*c).to_owned()).collect(),
            last_seen: self.bus.clock.now(),
        })
    }

    fn is_valid_peer(&self, peer_id: &str) -> bool {
        self.bus.is_connected(peer_id)
    }

    fn on_peer_event(&self, callback: PeerEventCallback) {
        let mut peers = self.bus.peers.write();
        if let Some(slot) = peers.iter_mut().find(|p| p.id == self.peer_id) {
            slot.listeners.push(callback);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<(String, Vec<u8>)>>,
    }

    #[async_trait]
    impl MessageHandler for Recorder {
        async fn handle(&self, payload: &[u8], sender_peer_id: &str) -> Result<(), CoordinationError> {
            self.seen
                .lock()
                .unwrap()
                .push((sender_peer_id.to_owned(), payload.to_vec()));
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl MessageHandler for Failing {
        async fn handle(&self, _payload: &[u8], _sender_peer_id: &str) -> Result<(), CoordinationError> {
            Err(CoordinationError::Internal("boom".into()))
        }
    }

    fn recorder() -> Arc<Recorder> {
        Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_other_peer() {
        // Arrange
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        let bob = bus.connect("bob", None).unwrap();
        let carol = bus.connect("carol", None).unwrap();
        let (a, b, c) = (recorder(), recorder(), recorder());
        alice.register_handler("chat", a.clone());
        bob.register_handler("chat", b.clone());
        carol.register_handler("chat", c.clone());

        // Act
        alice.broadcast("chat", b"hi").await.unwrap();

        // Assert
        assert!(a.seen.lock().unwrap().is_empty());
        assert_eq!(b.seen.lock().unwrap()[0], ("alice".to_owned(), b"hi".to_vec()));
        assert_eq!(c.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_targets_one_peer() {
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        let bob = bus.connect("bob", None).unwrap();
        let carol = bus.connect("carol", None).unwrap();
        let (b, c) = (recorder(), recorder());
        bob.register_handler("chat", b.clone());
        carol.register_handler("chat", c.clone());

        alice.send("chat", b"psst", "bob").await.unwrap();

        assert_eq!(b.seen.lock().unwrap().len(), 1);
        assert!(c.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_to_unknown_peer_is_unreachable() {
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();

        let result = alice.send("chat", b"hello?", "nobody").await;

        assert!(matches!(result, Err(TransportError::PeerUnreachable(p)) if p == "nobody"));
    }

    #[tokio::test]
    async fn test_handler_errors_are_not_returned_to_sender() {
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        let bob = bus.connect("bob", None).unwrap();
        bob.register_handler("chat", Arc::new(Failing));

        assert!(alice.broadcast("chat", b"x").await.is_ok());
        assert!(alice.send("chat", b"x", "bob").await.is_ok());
    }

    #[tokio::test]
    async fn test_disconnected_endpoint_is_closed() {
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        bus.connect("bob", None).unwrap();

        assert!(bus.disconnect("alice"));

        assert!(matches!(
            alice.broadcast("chat", b"x").await,
            Err(TransportError::Closed)
        ));
        assert_eq!(bus.peer_ids(), ["bob".to_owned()]);
    }

    #[test]
    fn test_duplicate_connect_is_rejected() {
        let bus = LocalBus::new();
        let _alice = bus.connect("alice", None).unwrap();

        assert!(bus.connect("alice", None).is_err());
    }

    #[test]
    fn test_peer_events_reach_other_peers() {
        // Arrange
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        alice.on_peer_event(Arc::new(move |event: PeerEvent, peer_id: &str| {
            sink.lock().unwrap().push((event, peer_id.to_owned()));
        }));

        // Act
        bus.connect("bob", None).unwrap();
        bus.connect("carol", None).unwrap();
        bus.disconnect("bob");
        bus.drop_peer("carol");
        bus.drop_peer("carol");

        // Assert
        assert_eq!(
            *events.lock().unwrap(),
            [
                (PeerEvent::Joined, "bob".to_owned()),
                (PeerEvent::Joined, "carol".to_owned()),
                (PeerEvent::Left, "bob".to_owned()),
                (PeerEvent::Disconnected, "carol".to_owned()),
            ]
        );
    }

    #[test]
    fn test_registry_reports_connected_peers() {
        let bus = LocalBus::new();
        let alice = bus.connect("alice", None).unwrap();
        bus.connect("bob", Some("Bobby")).unwrap();

        let info = alice.peer_info("bob").unwrap();

        assert_eq!(info.nickname.as_deref(), Some("Bobby"));
        assert_eq!(info.capabilities, ["group_events".to_owned()]);
        assert!(alice.is_valid_peer("bob"));
        assert!(!alice.is_valid_peer("mallory"));
        assert!(matches!(
            alice.peer_info("mallory"),
            Err(CoordinationError::UnknownPeer(_))
        ));
        assert_eq!(alice.connected_peers(), ["bob".to_owned()]);
    }
}
