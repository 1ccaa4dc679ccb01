//! Template resolution with a fixed default layout.

use std::{collections::HashMap, sync::Arc};

use thiserror::Error;
use tracing::debug;

use super::types::{RenderError, ResolvedTemplate};

/// Layout used whenever the requested template does not exist.
pub const DEFAULT_LAYOUT: &str = "SplashFitness";

#[derive(Debug, Clone, Error)]
pub enum TemplateStoreError {
    #[error("failed to read template `{name}`: {message}")]
    Read { name: String, message: String },
}

/// Source of template markup keyed by logical name.
pub trait TemplateStore: Send + Sync {
    /// `Ok(None)` when no template exists under exactly this name.
    fn load(&self, name: &str) -> Result<Option<String>, TemplateStoreError>;
}

/// Fixed set of templates held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: HashMap<String, String>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: impl Into<String>, markup: impl Into<String>) -> Self {
        self.templates.insert(name.into(), markup.into());
        self
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self, name: &str) -> Result<Option<String>, TemplateStoreError> {
        Ok(self.templates.get(name).cloned())
    }
}

/// Maps a template name to markup, falling back to the default layout.
///
/// Resolution only reads from the store, so the same name against the same
/// store always yields the same template.
#[derive(Clone)]
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    default_layout: String,
}

impl TemplateResolver {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        Self::with_default_layout(store, DEFAULT_LAYOUT)
    }

    pub fn with_default_layout(
        store: Arc<dyn TemplateStore>,
        default_layout: impl Into<String>,
    ) -> Self {
        Self {
            store,
            default_layout: default_layout.into(),
        }
    }

    pub fn default_layout(&self) -> &str {
        &self.default_layout
    }

    pub fn resolve(&self, name: &str) -> Result<ResolvedTemplate, RenderError> {
        if name.is_empty() {
            return Err(RenderError::validation("missing attendance template"));
        }

        if let Some(markup) = self.store.load(name)? {
            return Ok(ResolvedTemplate {
                requested: name.to_string(),
                name: name.to_string(),
                markup: Arc::from(markup),
            });
        }

        match self.store.load(&self.default_layout)? {
            Some(markup) => {
                debug!(
                    target = "application::render::templates",
                    requested = name,
                    fallback = %self.default_layout,
                    "template missing; using default layout"
                );
                Ok(ResolvedTemplate {
                    requested: name.to_string(),
                    name: self.default_layout.clone(),
                    markup: Arc::from(markup),
                })
            }
            None => Err(RenderError::TemplateNotFound {
                name: name.to_string(),
            }),
        }
    }
}
