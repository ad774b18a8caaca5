// src/job/layout.rs

use std::path::PathBuf;

use crate::config::provider::{SECTION_PARAMETERS, SECTION_PATHS};
use crate::config::ConfigProvider;
use crate::errors::{PatcherError, Result};

pub const DEFAULT_EDIT_SCRIPTS_SUBDIR: &str = "Edit Scripts";
pub const DEFAULT_LIBRARY_DIR_NAME: &str = "lib";
pub const DEFAULT_GAME_DATA_MARKER: &str = "Fallout4.esm";
pub const DEFAULT_GAME_VARIANT_FLAG: &str = "-FO4";
pub const DEFAULT_UNSAFE_EDIT_FLAGS: &[&str] = &["-IKnowWhatImDoing", "-AllowMasterFilesEdit"];

/// Filesystem layout and static editor arguments shared by every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorLayout {
    pub editor_executable: PathBuf,
    pub editor_dir: PathBuf,
    /// Where the editor looks for scripts; staged files go here.
    pub edit_scripts_dir: PathBuf,
    /// Where our own scripts (and their `lib` folder) live.
    pub scripts_dir: PathBuf,
    pub library_dir_name: String,
    pub game_data_path: PathBuf,
    pub game_data_marker: String,
    pub output_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub game_variant_flag: Option<String>,
    pub unsafe_edit_flags: Vec<String>,
}

impl EditorLayout {
    pub fn from_provider(cfg: &ConfigProvider) -> Result<Self> {
        let editor_executable = cfg.resolve_path(SECTION_PATHS, "editor_executable")?;
        let editor_dir = editor_executable
            .parent()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| {
                PatcherError::ConfigError(format!(
                    "[{SECTION_PATHS}].editor_executable has no parent directory: {}",
                    editor_executable.display()
                ))
            })?;
        let edit_scripts_dir = cfg
            .resolve_optional_path(SECTION_PATHS, "edit_scripts_dir")
            .unwrap_or_else(|| editor_dir.join(DEFAULT_EDIT_SCRIPTS_SUBDIR));
        let output_dir = cfg.resolve_path(SECTION_PATHS, "output_dir")?;

        let game_variant_flag = cfg.resolve_string(
            SECTION_PARAMETERS,
            "game_variant_flag",
            DEFAULT_GAME_VARIANT_FLAG,
        );

        Ok(Self {
            editor_dir,
            edit_scripts_dir,
            scripts_dir: cfg.resolve_path(SECTION_PATHS, "scripts_dir")?,
            library_dir_name: cfg.resolve_string(
                SECTION_PARAMETERS,
                "library_dir_name",
                DEFAULT_LIBRARY_DIR_NAME,
            ),
            game_data_path: cfg.resolve_path(SECTION_PATHS, "game_data_path")?,
            game_data_marker: cfg.resolve_string(
                SECTION_PARAMETERS,
                "game_data_marker",
                DEFAULT_GAME_DATA_MARKER,
            ),
            logs_dir: output_dir.join("logs"),
            output_dir,
            game_variant_flag: Some(game_variant_flag).filter(|f| !f.trim().is_empty()),
            unsafe_edit_flags: cfg.resolve_string_list(
                SECTION_PARAMETERS,
                "unsafe_edit_flags",
                DEFAULT_UNSAFE_EDIT_FLAGS,
            ),
            editor_executable,
        })
    }

    /// Shared support library next to our scripts.
    pub fn library_source(&self) -> PathBuf {
        self.scripts_dir.join(&self.library_dir_name)
    }

    /// Places the support library is installed into for a run.
    pub fn library_destinations(&self) -> Vec<PathBuf> {
        let mut out = vec![self.edit_scripts_dir.join(&self.library_dir_name)];
        let install = self.editor_dir.join(&self.library_dir_name);
        if !out.contains(&install) {
            out.push(install);
        }
        out
    }

    /// Image name the launcher's child will show up as.
    pub fn editor_image_name(&self) -> String {
        self.editor_executable
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
