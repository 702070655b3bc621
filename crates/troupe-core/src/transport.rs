//! Peer transport abstraction.
//!
//! The coordination core never opens connections itself. It consumes this
//! contract, which a networking layer (or the in-process bus) implements.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CoordinationError, TransportError};

/// Receives inbound payloads registered for one message type.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle a payload delivered by `sender_peer_id`.
    ///
    /// # Errors
    ///
    /// Returns `CoordinationError` when the payload cannot be applied. The
    /// transport reports the error and keeps delivering later messages.
    async fn handle(&self, payload: &[u8], sender_peer_id: &str) -> Result<(), CoordinationError>;
}

/// Message transport between peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a payload to a single peer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the peer cannot be reached.
    async fn send(
        &self,
        message_type: &str,
        payload: &[u8],
        target_peer_id: &str,
    ) -> Result<(), TransportError>;

    /// Send a payload to every connected peer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the broadcast could not be issued.
    async fn broadcast(&self, message_type: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Register the handler for inbound messages of `message_type`,
    /// replacing any previous registration.
    fn register_handler(&self, message_type: &str, handler: Arc<dyn MessageHandler>);

    /// Returns the IDs of the currently connected remote peers.
    fn connected_peers(&self) -> Vec<String>;

    /// Returns the ID of the local peer.
    fn local_peer_id(&self) -> String;
}
