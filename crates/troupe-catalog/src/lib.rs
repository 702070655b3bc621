//! Troupe Catalog: immutable group event templates.
//!
//! Templates are loaded once at startup, from a YAML document or from the
//! built-in set, validated, and then shared read-only by every session.

pub mod catalog;
pub mod domain;
pub mod error;

pub use catalog::TemplateCatalog;
pub use domain::template::{Choice, Phase, PhaseKind, Template, TemplateCategory};
pub use error::CatalogError;
