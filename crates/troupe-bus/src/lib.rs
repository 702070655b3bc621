//! Troupe Bus: in-process peer transport.
//!
//! Hosts several peers in one process. Each connected peer gets a
//! [`BusEndpoint`] implementing both the transport and the peer registry
//! contracts. Delivery is inline and in connection order.

mod bus;

pub use bus::{BusEndpoint, LocalBus};
