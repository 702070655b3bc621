//! Validated, read-only template catalog.

use std::collections::HashSet;
use std::path::Path;

use tracing::{info, warn};

use crate::domain::template::Template;
use crate::error::CatalogError;

const BUILTIN_TEMPLATES: &str = include_str!("../templates/default.yaml");

/// The immutable set of templates available to sessions.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// Largest group any template may declare.
    pub const MAX_GROUP_SIZE: usize = 8;

    /// Builds a catalog from already-parsed templates.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if any template fails validation.
    pub fn new(templates: Vec<Template>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for template in &templates {
            if !seen.insert(template.id.as_str()) {
                return Err(CatalogError::DuplicateTemplate(template.id.clone()));
            }
            validate(template)?;
        }
        info!(templates = templates.len(), "template catalog loaded");
        Ok(Self { templates })
    }

    /// Parses a YAML sequence of templates.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Parse` for malformed YAML and any validation
    /// error from [`TemplateCatalog::new`].
    pub fn from_yaml_str(document: &str) -> Result<Self, CatalogError> {
        let templates: Vec<Template> = serde_yaml::from_str(document)?;
        Self::new(templates)
    }

    /// Reads and parses a YAML catalog file.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Io` if the file cannot be read, otherwise as
    /// [`TemplateCatalog::from_yaml_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let document = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&document)
    }

    /// Loads the templates shipped with the crate.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if the bundled document is invalid.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_yaml_str(BUILTIN_TEMPLATES)
    }

    /// Looks up a template by ID.
    #[must_use]
    pub fn get(&self, template_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    /// All templates in declaration order.
    #[must_use]
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Returns `true` if the catalog holds no templates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

fn validate(template: &Template) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::Invalid {
        template_id: template.id.clone(),
        reason,
    };

    if template.id.trim().is_empty() {
        return Err(invalid("template id must not be empty".to_owned()));
    }
    if template.min_participants == 0
        || template.min_participants > template.max_participants
        || template.max_participants > TemplateCatalog::MAX_GROUP_SIZE
    {
        return Err(invalid(format!(
            "participant bounds {}..={} must satisfy 1 <= min <= max <= {}",
            template.min_participants,
            template.max_participants,
            TemplateCatalog::MAX_GROUP_SIZE
        )));
    }
    if template.phases.is_empty() {
        return Err(invalid("template has no phases".to_owned()));
    }

    let mut phase_names = HashSet::new();
    for phase in &template.phases {
        if !phase_names.insert(phase.name.as_str()) {
            return Err(invalid(format!("duplicate phase name: {}", phase.name)));
        }
        let mut choice_ids = HashSet::new();
        for choice in &phase.choices {
            if !choice_ids.insert(choice.id.as_str()) {
                return Err(invalid(format!(
                    "duplicate choice id {} in phase {}",
                    choice.id, phase.name
                )));
            }
            if choice.points < 0 {
                warn!(
                    template_id = %template.id,
                    phase = %phase.name,
                    choice_id = %choice.id,
                    points = choice.points,
                    "choice awards negative points"
                );
            }
        }
    }
    Ok(())
}
