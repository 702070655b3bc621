//! Test transports: mock `Transport` implementations for tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use troupe_core::error::{CoordinationError, TransportError};
use troupe_core::transport::{MessageHandler, Transport};

/// One call made against a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Transport-level message type.
    pub message_type: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
    /// Target peer for `send`; `None` for `broadcast`.
    pub target: Option<String>,
}

impl SentMessage {
    /// Parse the payload as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the payload is not valid JSON.
    #[must_use]
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).expect("payload is JSON")
    }

    /// The `type` field of a group event envelope.
    #[must_use]
    pub fn kind(&self) -> String {
        self.json()["type"].as_str().unwrap_or_default().to_owned()
    }
}

/// A transport that records every `send` and `broadcast` call and lets the
/// test deliver inbound messages to the registered handlers.
pub struct RecordingTransport {
    local_peer_id: String,
    peers: Mutex<Vec<String>>,
    sent: Mutex<Vec<SentMessage>>,
    handlers: Mutex<HashMap<String, Arc<dyn MessageHandler>>>,
    fail_broadcasts: Mutex<bool>,
}

impl RecordingTransport {
    /// Create a transport for `local_peer_id` with the given connected peers.
    #[must_use]
    pub fn new(local_peer_id: &str, peers: &[&str]) -> Self {
        Self {
            local_peer_id: local_peer_id.to_owned(),
            peers: Mutex::new(peers.iter().map(|p| (*p).to_owned()).collect()),
            sent: Mutex::new(Vec::new()),
            handlers: Mutex::new(HashMap::new()),
            fail_broadcasts: Mutex::new(false),
        }
    }

    /// Replace the connected peer list.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_connected_peers(&self, peers: &[&str]) {
        *self.peers.lock().unwrap() = peers.iter().map(|p| (*p).to_owned()).collect();
    }

    /// Make every subsequent `broadcast` fail (or succeed again).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_broadcasts(&self, fail: bool) {
        *self.fail_broadcasts.lock().unwrap() = fail;
    }

    /// Returns a snapshot of every recorded call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the envelope `type` of every recorded call, in order.
    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent().iter().map(SentMessage::kind).collect()
    }

    /// Forget every recorded call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    /// Returns `true` if a handler is registered for `message_type`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn has_handler(&self, message_type: &str) -> bool {
        self.handlers.lock().unwrap().contains_key(message_type)
    }

    /// Deliver an inbound payload to the handler registered for
    /// `message_type`, as if `sender_peer_id` had sent it.
    ///
    /// # Errors
    ///
    /// Returns the handler's error, or `CoordinationError::Internal` if no
    /// handler is registered.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub async fn deliver(
        &self,
        message_type: &str,
        payload: &[u8],
        sender_peer_id: &str,
    ) -> Result<(), CoordinationError> {
        let handler = self.handlers.lock().unwrap().get(message_type).cloned();
        match handler {
            Some(handler) => handler.handle(payload, sender_peer_id).await,
            None => Err(CoordinationError::Internal(format!(
                "no handler registered for {message_type}"
            ))),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(
        &self,
        message_type: &str,
        payload: &[u8],
        target_peer_id: &str,
    ) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(SentMessage {
            message_type: message_type.to_owned(),
            payload: payload.to_vec(),
            target: Some(target_peer_id.to_owned()),
        });
        Ok(())
    }

    async fn broadcast(&self, message_type: &str, payload: &[u8]) -> Result<(), TransportError> {
        if *self.fail_broadcasts.lock().unwrap() {
            return Err(TransportError::Other("connection refused".into()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            message_type: message_type.to_owned(),
            payload: payload.to_vec(),
            target: None,
        });
        Ok(())
    }

    fn register_handler(&self, message_type: &str, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .lock()
            .unwrap()
            .insert(message_type.to_owned(), handler);
    }

    fn connected_peers(&self) -> Vec<String> {
        self.peers.lock().unwrap().clone()
    }

    fn local_peer_id(&self) -> String {
        self.local_peer_id.clone()
    }
}

/// A transport whose `send` and `broadcast` always fail. Useful for testing
/// rollback and error-surfacing paths.
#[derive(Debug)]
pub struct FailingTransport {
    local_peer_id: String,
    peers: Vec<String>,
}

impl FailingTransport {
    /// Create a failing transport that still reports `peers` as connected.
    #[must_use]
    pub fn new(local_peer_id: &str, peers: &[&str]) -> Self {
        Self {
            local_peer_id: local_peer_id.to_owned(),
            peers: peers.iter().map(|p| (*p).to_owned()).collect(),
        }
    }
}

#[async_trait]
impl Transport for FailingTransport {
    async fn send(
        &self,
        _message_type: &str,
        _payload: &[u8],
        _target_peer_id: &str,
    ) -> Result<(), TransportError> {
        Err(TransportError::Other("connection refused".into()))
    }

    async fn broadcast(&self, _message_type: &str, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::Other("connection refused".into()))
    }

    fn register_handler(&self, _message_type: &str, _handler: Arc<dyn MessageHandler>) {}

    fn connected_peers(&self) -> Vec<String> {
        self.peers.clone()
    }

    fn local_peer_id(&self) -> String {
        self.local_peer_id.clone()
    }
}
