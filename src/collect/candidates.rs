// src/collect/candidates.rs

use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::provider::{SECTION_PARAMETERS, SECTION_PATHS};
use crate::config::{ConfigProvider, EnvironmentSettings};
use crate::errors::Result;
use crate::fs::FileSystem;

pub const DEFAULT_EDITOR_OUTPUT_SUBDIR: &str = "Edit Scripts/Output";

/// Where a job's output files might end up, in priority order:
///
/// 1. the launcher's redirected output folder (intermediary mode only),
/// 2. an explicitly configured alternate redirect folder,
/// 3. the editor's own output subfolder,
/// 4. the canonical output folder itself (reruns / idempotency).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSources {
    pub overwrite_dir: Option<PathBuf>,
    pub redirect_dir: Option<PathBuf>,
    pub editor_output_dir: Option<PathBuf>,
    pub canonical_dir: PathBuf,
}

impl CandidateSources {
    pub fn from_provider(cfg: &ConfigProvider, env: &EnvironmentSettings) -> Result<Self> {
        let canonical_dir = cfg.resolve_path(SECTION_PATHS, "output_dir")?;
        let editor_dir = cfg
            .resolve_path(SECTION_PATHS, "editor_executable")?
            .parent()
            .map(|p| p.to_path_buf());
        let subdir = cfg.resolve_string(
            SECTION_PARAMETERS,
            "editor_output_subdir",
            DEFAULT_EDITOR_OUTPUT_SUBDIR,
        );

        Ok(Self {
            overwrite_dir: if env.use_intermediary {
                env.overwrite_dir.clone()
            } else {
                None
            },
            redirect_dir: cfg.resolve_optional_path(SECTION_PATHS, "redirect_output_dir"),
            editor_output_dir: editor_dir.map(|d| d.join(subdir.trim())),
            canonical_dir,
        })
    }

    /// All configured directories in priority order, existing or not.
    pub fn ordered(&self) -> Vec<PathBuf> {
        [
            self.overwrite_dir.clone(),
            self.redirect_dir.clone(),
            self.editor_output_dir.clone(),
            Some(self.canonical_dir.clone()),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Existing directories only, deduplicated by resolved absolute path.
    pub fn existing_dirs(&self, fs: &dyn FileSystem) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.ordered()
            .into_iter()
            .filter(|dir| fs.is_dir(dir))
            .filter(|dir| {
                let key = fs.canonicalize(dir).unwrap_or_else(|_| dir.clone());
                seen.insert(key)
            })
            .collect()
    }
}
