//! Filesystem-backed template store: `<dir>/<name>.html`.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::application::render::{TemplateStore, TemplateStoreError};

const TEMPLATE_EXTENSION: &str = "html";

#[derive(Debug, Clone)]
pub struct FsTemplateStore {
    root: PathBuf,
}

impl FsTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a configured directory: as given when absolute, otherwise
    /// against the working directory first and the executable's directory
    /// second. Falls back to the working-directory candidate.
    pub fn locate(configured: &Path) -> Self {
        if configured.is_absolute() {
            return Self::new(configured);
        }

        let from_cwd = std::env::current_dir()
            .map(|cwd| cwd.join(configured))
            .unwrap_or_else(|_| configured.to_path_buf());
        if from_cwd.is_dir() {
            return Self::new(from_cwd);
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(configured)))
            .filter(|candidate| candidate.is_dir());

        Self::new(beside_exe.unwrap_or(from_cwd))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        if !is_plain_name(name) {
            return None;
        }
        Some(self.root.join(format!("{name}.{TEMPLATE_EXTENSION}")))
    }
}

impl TemplateStore for FsTemplateStore {
    fn load(&self, name: &str) -> Result<Option<String>, TemplateStoreError> {
        let Some(path) = self.path_for(name) else {
            return Ok(None);
        };
        match std::fs::read_to_string(&path) {
            Ok(markup) => Ok(Some(markup)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TemplateStoreError::Read {
                name: name.to_string(),
                message: format!("{}: {err}", path.display()),
            }),
        }
    }
}

/// A name that stays inside the template directory.
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
}
