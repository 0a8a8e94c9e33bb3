//! Loading checklist templates.
//!
//! Template declarations are read once at startup; see [`crate::FieldMetadataCache`].

use crate::model::Template;
use crate::{CoreError, CoreResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Supplies every known template.
pub trait TemplateSource: Send + Sync {
    fn load_all(&self) -> CoreResult<Vec<Template>>;
}

impl TemplateSource for Vec<Template> {
    fn load_all(&self) -> CoreResult<Vec<Template>> {
        Ok(self.clone())
    }
}

/// Reads one template per `*.json`, `*.yaml` or `*.yml` file in a directory.
#[derive(Debug, Clone)]
pub struct FsTemplateSource {
    dir: PathBuf,
}

impl FsTemplateSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn load_file(path: &Path) -> CoreResult<Template> {
        let raw = fs::read_to_string(path).map_err(CoreError::FileRead)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
        let template = if is_yaml {
            serde_yaml::from_str(&raw)?
        } else {
            serde_json::from_str(&raw)?
        };
        Ok(template)
    }
}

impl TemplateSource for FsTemplateSource {
    /// Loads templates in file-name order.
    ///
    /// # Errors
    ///
    /// Fails on the first unreadable or malformed file; a half-loaded template set would give
    /// inconsistent labels.
    fn load_all(&self) -> CoreResult<Vec<Template>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .map_err(CoreError::FileRead)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| matches!(e.to_ascii_lowercase().as_str(), "json" | "yaml" | "yml"))
            })
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                Self::load_file(path).map_err(|e| {
                    CoreError::Configuration(format!("template {}: {}", path.display(), e))
                })
            })
            .collect()
    }
}
