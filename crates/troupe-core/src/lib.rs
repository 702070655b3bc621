//! Troupe Core: shared abstractions for group event coordination.
//!
//! This crate defines the seams every other crate depends on: time,
//! randomness, the peer transport and the peer registry. It contains no
//! infrastructure code.

pub mod clock;
pub mod error;
pub mod peer;
pub mod rng;
pub mod transport;
