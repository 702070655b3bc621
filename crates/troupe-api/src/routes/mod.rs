//! Route modules.

pub mod health;
pub mod peers;
pub mod sessions;
pub mod templates;
