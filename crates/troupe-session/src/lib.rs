//! Troupe Session: group event coordination.
//!
//! Owns the authoritative local copy of every active session, runs the
//! phase state machine, and keeps sessions loosely in step with other peers
//! by broadcasting each local mutation and applying remote ones.

pub mod application;
pub mod domain;

pub use application::coordinator::{CoordinatorBuilder, CoordinatorConfig, GroupEventCoordinator};
pub use application::invitation::{Invitation, InvitationHandler, InvitationReply};
pub use application::reaper::spawn_reaper;
pub use application::store::SweepReport;
pub use domain::history::CompletedRecord;
pub use domain::session::Session;
