//! Shared application state: the simulated peers hosted on one bus.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::info;
use troupe_bus::{BusEndpoint, LocalBus};
use troupe_catalog::TemplateCatalog;
use troupe_core::clock::Clock;
use troupe_session::{
    CoordinatorConfig, GroupEventCoordinator, Invitation, InvitationReply, spawn_reaper,
};

use crate::error::ApiError;

/// Pending invitations of one peer, each with its reply continuation.
#[derive(Debug, Default)]
pub struct InvitationInbox {
    pending: Mutex<Vec<InvitationReply>>,
}

impl InvitationInbox {
    /// Stores an invitation. A newer invitation for the same session
    /// replaces the older one.
    pub fn push(&self, reply: InvitationReply) {
        let mut pending = self.pending.lock();
        pending.retain(|r| r.invitation().session_id != reply.invitation().session_id);
        pending.push(reply);
    }

    /// Pending invitations, oldest first.
    #[must_use]
    pub fn list(&self) -> Vec<Invitation> {
        self.pending
            .lock()
            .iter()
            .map(|r| r.invitation().clone())
            .collect()
    }

    /// Removes and returns the invitation for `session_id`.
    pub fn take(&self, session_id: &str) -> Option<InvitationReply> {
        let mut pending = self.pending.lock();
        let position = pending
            .iter()
            .position(|r| r.invitation().session_id == session_id)?;
        Some(pending.remove(position))
    }
}

struct PeerHandle {
    coordinator: GroupEventCoordinator,
    inbox: Arc<InvitationInbox>,
    reaper: Option<JoinHandle<()>>,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The bus every simulated peer is attached to.
    pub bus: Arc<LocalBus>,
    pub catalog: Arc<TemplateCatalog>,
    pub clock: Arc<dyn Clock>,
    pub coordinator_config: CoordinatorConfig,
    /// Period of each peer's sweeper; `None` runs no sweeper.
    pub sweep_interval: Option<Duration>,
    peers: Arc<RwLock<HashMap<String, PeerHandle>>>,
}

impl AppState {
    /// Create new application state with no peers connected.
    #[must_use]
    pub fn new(
        catalog: Arc<TemplateCatalog>,
        clock: Arc<dyn Clock>,
        coordinator_config: CoordinatorConfig,
        sweep_interval: Option<Duration>,
    ) -> Self {
        Self {
            bus: LocalBus::with_clock(Arc::clone(&clock)),
            catalog,
            clock,
            coordinator_config,
            sweep_interval,
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Connects a simulated peer to the bus and starts its coordinator.
    ///
    /// Must be called inside a Tokio runtime when a sweep interval is
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::PeerAlreadyConnected` if the ID is taken.
    pub fn connect_peer(&self, peer_id: &str) -> Result<GroupEventCoordinator, ApiError> {
        let mut peers = self.peers.write();
        if peers.contains_key(peer_id) {
            return Err(ApiError::PeerAlreadyConnected(peer_id.to_owned()));
        }
        let endpoint: Arc<BusEndpoint> = Arc::new(
            self.bus
                .connect(peer_id, None)
                .map_err(|_| ApiError::PeerAlreadyConnected(peer_id.to_owned()))?,
        );

        let inbox = Arc::new(InvitationInbox::default());
        let sink = Arc::clone(&inbox);
        let coordinator =
            GroupEventCoordinator::builder(Arc::clone(&self.catalog), endpoint.clone())
                .peer_registry(endpoint)
                .clock(Arc::clone(&self.clock))
                .config(self.coordinator_config)
                .invitation_handler(Arc::new(
                    move |_invitation: Invitation, reply: InvitationReply| sink.push(reply),
                ))
                .build();
        let reaper = self
            .sweep_interval
            .map(|period| spawn_reaper(coordinator.clone(), period));

        peers.insert(
            peer_id.to_owned(),
            PeerHandle {
                coordinator: coordinator.clone(),
                inbox,
                reaper,
            },
        );
        info!(peer_id, "simulated peer connected");
        Ok(coordinator)
    }

    /// Disconnects a simulated peer. The other peers see it leave.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::PeerNotFound` if no such peer is hosted.
    pub fn disconnect_peer(&self, peer_id: &str) -> Result<(), ApiError> {
        let handle = self
            .peers
            .write()
            .remove(peer_id)
            .ok_or_else(|| ApiError::PeerNotFound(peer_id.to_owned()))?;
        if let Some(reaper) = handle.reaper {
            reaper.abort();
        }
        self.bus.disconnect(peer_id);
        info!(peer_id, "simulated peer disconnected");
        Ok(())
    }

    /// The coordinator of a hosted peer.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::PeerNotFound` if no such peer is hosted.
    pub fn coordinator(&self, peer_id: &str) -> Result<GroupEventCoordinator, ApiError> {
        self.peers
            .read()
            .get(peer_id)
            .map(|h| h.coordinator.clone())
            .ok_or_else(|| ApiError::PeerNotFound(peer_id.to_owned()))
    }

    /// The invitation inbox of a hosted peer.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::PeerNotFound` if no such peer is hosted.
    pub fn inbox(&self, peer_id: &str) -> Result<Arc<InvitationInbox>, ApiError> {
        self.peers
            .read()
            .get(peer_id)
            .map(|h| Arc::clone(&h.inbox))
            .ok_or_else(|| ApiError::PeerNotFound(peer_id.to_owned()))
    }

    /// IDs of hosted peers in connection order.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<String> {
        self.bus.peer_ids()
    }
}
