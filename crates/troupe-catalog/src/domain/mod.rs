//! Template domain types.

pub mod template;
