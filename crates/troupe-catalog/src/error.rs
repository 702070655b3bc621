//! Catalog loading errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a template catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read template catalog {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog document is not valid YAML for the template schema.
    #[error("failed to parse template catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Two templates share an ID.
    #[error("duplicate template id: {0}")]
    DuplicateTemplate(String),

    /// A template violates a structural rule.
    #[error("invalid template {template_id}: {reason}")]
    Invalid {
        /// The offending template.
        template_id: String,
        /// What is wrong with it.
        reason: String,
    },
}
