//! Shared test mocks and utilities for Troupe.

mod clock;
mod peer;
mod rng;
mod transport;

pub use clock::{FixedClock, ManualClock};
pub use peer::MockPeerRegistry;
pub use rng::{CountingRng, MockRng, SequenceRng};
pub use transport::{FailingTransport, RecordingTransport, SentMessage};
