//! Application services: the coordinator, inbound router and sweeper.

pub mod coordinator;
pub mod invitation;
pub mod reaper;
pub mod router;
pub mod store;
