// src/job/staging.rs

//! Per-run staging state.
//!
//! [`RunContext`] records every change a job makes to shared directories
//! (the staged script, library swaps) as it makes them, so teardown can undo
//! exactly what was done. Teardown runs from the runner's cleanup phase and,
//! as a backstop, from `Drop`; it is idempotent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Local;
use tokio::process::Child;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fs::FileSystem;
use crate::job::layout::EditorLayout;
use crate::process::ProcessInfo;

/// Prefix for staged scripts so stray files are recognisable.
pub const STAGED_SCRIPT_PREFIX: &str = "AP_";

/// Unique per-run tag: local timestamp plus a random suffix.
pub fn new_run_tag() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), &random[..8])
}

/// One library destination touched by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LibraryStage {
    destination: PathBuf,
    /// Where a pre-existing directory was moved aside to.
    backup: Option<PathBuf>,
}

/// Mutable state of a single job run.
#[derive(Debug)]
pub struct RunContext {
    pub job_key: String,
    pub run_tag: String,
    pub source_script_path: PathBuf,
    pub staged_script_path: PathBuf,
    pub session_log_path: PathBuf,
    /// Captured stdout/stderr of a direct-mode editor.
    pub capture_log_path: PathBuf,
    pub started_at: SystemTime,

    pub direct_child: Option<Child>,
    pub launcher: Option<Child>,
    pub discovered: Option<ProcessInfo>,
    /// The target process may still be alive (wait timed out).
    pub target_may_be_running: bool,

    fs: Arc<dyn FileSystem>,
    script_staged: bool,
    library: Vec<LibraryStage>,
    restored: bool,
}

impl RunContext {
    /// Compute all per-run paths. Touches nothing on disk.
    pub fn new(
        fs: Arc<dyn FileSystem>,
        layout: &EditorLayout,
        job_key: &str,
        script_filename: &str,
    ) -> Self {
        let run_tag = new_run_tag();
        let source_script_path = layout.scripts_dir.join(script_filename);

        let stem = Path::new(script_filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| job_key.to_string());
        let extension = Path::new(script_filename)
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "pas".to_string());

        let staged_name = format!("{STAGED_SCRIPT_PREFIX}{stem}_{run_tag}.{extension}");

        Self {
            job_key: job_key.to_string(),
            source_script_path,
            staged_script_path: layout.edit_scripts_dir.join(staged_name),
            session_log_path: layout.logs_dir.join(format!("{stem}_{run_tag}.log")),
            capture_log_path: layout.logs_dir.join(format!("{stem}_{run_tag}.stdout.log")),
            run_tag,
            started_at: SystemTime::now(),
            direct_child: None,
            launcher: None,
            discovered: None,
            target_may_be_running: false,
            fs,
            script_staged: false,
            library: Vec::new(),
            restored: false,
        }
    }

    /// File name of the staged script (what the launcher form passes).
    pub fn staged_file_name(&self) -> String {
        self.staged_script_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Copy the job script into the editor's script directory.
    pub fn stage_script(&mut self) -> Result<()> {
        if !self.fs.is_file(&self.source_script_path) {
            anyhow::bail!("script file not found: {:?}", self.source_script_path);
        }
        if let Some(parent) = self.staged_script_path.parent() {
            if !self.fs.is_dir(parent) {
                anyhow::bail!("editor script directory not found: {:?}", parent);
            }
        }

        // Recorded first: a partial copy must still be removed.
        self.script_staged = true;
        self.fs
            .copy_file(&self.source_script_path, &self.staged_script_path)
            .context("staging job script")?;

        info!(
            job = %self.job_key,
            staged = %self.staged_script_path.display(),
            "script staged"
        );
        Ok(())
    }

    /// Install a fresh copy of the support library at each destination,
    /// moving any existing directory aside first. No-op when the source
    /// library does not exist.
    pub fn stage_library(&mut self, source: &Path, destinations: &[PathBuf]) -> Result<()> {
        if !self.fs.is_dir(source) {
            debug!(source = %source.display(), "no support library to stage");
            return Ok(());
        }

        for destination in destinations {
            let mut stage = LibraryStage {
                destination: destination.clone(),
                backup: None,
            };

            if self.fs.exists(destination) {
                let backup = backup_path(destination, &self.run_tag);
                self.fs
                    .rename(destination, &backup)
                    .with_context(|| format!("moving {:?} aside", destination))?;
                debug!(
                    original = %destination.display(),
                    backup = %backup.display(),
                    "existing library moved aside"
                );
                stage.backup = Some(backup);
            }

            self.library.push(stage);
            self.fs
                .copy_dir_all(source, destination)
                .with_context(|| format!("installing library into {:?}", destination))?;
        }

        info!(
            job = %self.job_key,
            destinations = self.library.len(),
            "support library staged"
        );
        Ok(())
    }

    /// Undo every filesystem change made by this run.
    ///
    /// Never fails: problems are logged as cleanup warnings so they cannot
    /// mask the job outcome.
    pub fn restore_filesystem(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        if self.script_staged && self.fs.exists(&self.staged_script_path) {
            match self.fs.remove_file(&self.staged_script_path) {
                Ok(()) => debug!(path = %self.staged_script_path.display(), "staged script removed"),
                Err(err) => warn!(
                    path = %self.staged_script_path.display(),
                    error = %err,
                    "cleanup warning: could not remove staged script"
                ),
            }
        }

        while let Some(stage) = self.library.pop() {
            self.restore_library(stage);
        }
    }

    fn restore_library(&self, stage: LibraryStage) {
        let LibraryStage {
            destination,
            backup,
        } = stage;

        if self.fs.exists(&destination) {
            if let Err(err) = self.fs.remove_dir_all(&destination) {
                warn!(
                    path = %destination.display(),
                    error = %err,
                    "cleanup warning: could not remove staged library"
                );
                if let Some(backup) = backup {
                    warn!(
                        backup = %backup.display(),
                        "cleanup warning: original library left at backup location"
                    );
                }
                return;
            }
        }

        if let Some(backup) = backup {
            match self.fs.rename(&backup, &destination) {
                Ok(()) => debug!(path = %destination.display(), "original library restored"),
                Err(err) => warn!(
                    backup = %backup.display(),
                    path = %destination.display(),
                    error = %err,
                    "cleanup warning: could not restore original library"
                ),
            }
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if !self.restored {
            warn!(job = %self.job_key, "run context dropped before cleanup; restoring now");
            self.restore_filesystem();
        }
    }
}

/// `<dir>/lib` → `<dir>/lib.backup_<tag>`.
pub fn backup_path(destination: &Path, run_tag: &str) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lib".to_string());
    destination.with_file_name(format!("{name}.backup_{run_tag}"))
}
