//! Domain types for group event sessions.

pub mod history;
pub mod messages;
pub mod scoring;
pub mod session;
pub mod tally;
