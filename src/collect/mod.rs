// src/collect/mod.rs

//! Artifact recovery.
//!
//! The editor (or the launcher's virtual filesystem) may drop output files
//! in several places, sometimes leaving stale copies from earlier runs. The
//! collector searches an ordered set of candidate directories, picks the
//! freshest copy of each expected file and moves it into the canonical
//! output directory with a copy → size check → rename sequence, so the
//! destination is never observed half-written.

pub mod candidates;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{anyhow, bail, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::fs::FileSystem;

pub use candidates::CandidateSources;

/// One successfully collected file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedArtifact {
    pub name: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Outcome of a [`ArtifactCollector::collect`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub collected: Vec<CollectedArtifact>,
    pub missing: Vec<String>,
}

impl CollectionReport {
    /// Success requires every expected file; partial results stay on disk.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Choose the most recently modified candidate.
///
/// Ties keep the earliest entry, i.e. the higher-priority directory.
pub fn pick_most_recent(candidates: &[(PathBuf, SystemTime)]) -> Option<&PathBuf> {
    let mut best: Option<&(PathBuf, SystemTime)> = None;
    for candidate in candidates {
        match best {
            Some((_, best_time)) if candidate.1 <= *best_time => {}
            _ => best = Some(candidate),
        }
    }
    best.map(|(path, _)| path)
}

#[derive(Debug, Clone)]
pub struct ArtifactCollector {
    fs: Arc<dyn FileSystem>,
    sources: CandidateSources,
}

impl ArtifactCollector {
    pub fn new(fs: Arc<dyn FileSystem>, sources: CandidateSources) -> Self {
        Self { fs, sources }
    }

    /// Ordered, deduplicated, existing candidate directories.
    ///
    /// Recomputed on every call: directories may appear while a job runs.
    pub fn candidate_output_dirs(&self) -> Vec<PathBuf> {
        self.sources.existing_dirs(self.fs.as_ref())
    }

    /// Every copy of `name` across the candidate directories, in priority
    /// order, with modification times.
    pub fn find_all(&self, name: &str) -> Vec<(PathBuf, SystemTime)> {
        if !is_bare_file_name(name) {
            warn!(file = name, "expected output is not a bare file name; ignoring");
            return Vec::new();
        }

        let mut found = Vec::new();
        for dir in self.candidate_output_dirs() {
            let path = dir.join(name);
            if !self.fs.is_file(&path) {
                continue;
            }
            match self.fs.modified(&path) {
                Ok(mtime) => found.push((path, mtime)),
                Err(err) => debug!(path = %path.display(), error = %err, "skipping unreadable candidate"),
            }
        }
        found
    }

    /// The copy of `name` that should win, if any exists.
    pub fn locate(&self, name: &str) -> Option<PathBuf> {
        let found = self.find_all(name);
        if found.len() > 1 {
            debug!(
                file = name,
                copies = found.len(),
                "multiple copies found; picking the most recently modified"
            );
        }
        pick_most_recent(&found).cloned()
    }

    /// Whether at least one expected file exists anywhere we look.
    pub fn any_present(&self, names: &[String]) -> bool {
        names.iter().any(|name| !self.find_all(name).is_empty())
    }

    /// Collect each expected file into the canonical directory.
    ///
    /// Files that were collected are kept even when others are missing.
    pub fn collect(&self, names: &[String]) -> CollectionReport {
        let mut report = CollectionReport::default();

        for name in names {
            let Some(source) = self.locate(name) else {
                warn!(file = %name, "expected output not found in any candidate directory");
                report.missing.push(name.clone());
                continue;
            };

            let destination = self.sources.canonical_dir.join(name);
            match self.copy_atomically(&source, &destination) {
                Ok(()) => {
                    info!(
                        file = %name,
                        source = %source.display(),
                        destination = %destination.display(),
                        "collected artifact"
                    );
                    report.collected.push(CollectedArtifact {
                        name: name.clone(),
                        source,
                        destination,
                    });
                }
                Err(err) => {
                    warn!(file = %name, error = %err, "failed to collect artifact");
                    report.missing.push(name.clone());
                }
            }
        }

        report
    }

    /// Copy to a temp sibling, check the size, then rename over the
    /// destination. The destination is untouched on any failure.
    fn copy_atomically(&self, source: &Path, destination: &Path) -> Result<()> {
        if self.same_file(source, destination) {
            debug!(path = %destination.display(), "artifact already in canonical location");
            return Ok(());
        }

        let dir = destination
            .parent()
            .ok_or_else(|| anyhow!("destination {:?} has no parent", destination))?;
        self.fs.create_dir_all(dir)?;

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

        let result = self.copy_verify_rename(source, &temp, destination);
        if result.is_err() && self.fs.exists(&temp) {
            if let Err(err) = self.fs.remove_file(&temp) {
                warn!(path = %temp.display(), error = %err, "could not remove temp copy");
            }
        }
        result
    }

    fn copy_verify_rename(&self, source: &Path, temp: &Path, destination: &Path) -> Result<()> {
        let expected = self.fs.file_len(source)?;
        self.fs.copy_file(source, temp)?;
        let actual = self.fs.file_len(temp)?;
        if actual != expected {
            bail!(
                "size mismatch after copying {:?}: expected {} bytes, got {}",
                source,
                expected,
                actual
            );
        }
        self.fs.rename(temp, destination)?;
        Ok(())
    }

    fn same_file(&self, a: &Path, b: &Path) -> bool {
        if !self.fs.exists(b) {
            return false;
        }
        match (self.fs.canonicalize(a), self.fs.canonicalize(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\'])
        && name != "."
        && name != ".."
}
