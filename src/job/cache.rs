// src/job/cache.rs

//! Editor load-order cache policy.
//!
//! The editor can reuse a `*.cache` file from a previous session, which
//! saves minutes on large load orders. We only ask for it when caching is
//! enabled and the newest cache file is recent enough.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::provider::SECTION_PARAMETERS;
use crate::config::ConfigProvider;
use crate::fs::FileSystem;

pub const DEFAULT_CACHE_DIR_NAME: &str = "FO4Edit Cache";
pub const DEFAULT_MAX_CACHE_AGE_HOURS: u64 = 168;

/// Whether a cache last written at `newest` is still usable at `now`.
pub fn cache_is_fresh(newest: SystemTime, now: SystemTime, max_age: Duration) -> bool {
    match now.duration_since(newest) {
        Ok(age) => age <= max_age,
        // Written "in the future" (clock skew): treat as fresh.
        Err(_) => true,
    }
}

#[derive(Debug, Clone)]
pub struct EditorCache {
    fs: Arc<dyn FileSystem>,
    enabled: bool,
    dir: PathBuf,
    max_age: Duration,
}

impl EditorCache {
    pub fn new(fs: Arc<dyn FileSystem>, enabled: bool, dir: PathBuf, max_age: Duration) -> Self {
        Self {
            fs,
            enabled,
            dir,
            max_age,
        }
    }

    pub fn from_provider(cfg: &ConfigProvider, fs: Arc<dyn FileSystem>, editor_dir: &Path) -> Self {
        let hours: u64 = cfg.resolve_numeric(
            SECTION_PARAMETERS,
            "max_cache_age_hours",
            DEFAULT_MAX_CACHE_AGE_HOURS,
        );
        let dir = cfg
            .resolve_optional_path(SECTION_PARAMETERS, "editor_cache_dir")
            .unwrap_or_else(|| editor_dir.join(DEFAULT_CACHE_DIR_NAME));

        Self::new(
            fs,
            cfg.resolve_bool(SECTION_PARAMETERS, "use_editor_cache", false),
            dir,
            Duration::from_secs(hours.saturating_mul(3600)),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All `*.cache` files in the cache directory.
    pub fn cache_files(&self) -> Vec<PathBuf> {
        if !self.fs.is_dir(&self.dir) {
            return Vec::new();
        }
        match self.fs.read_dir(&self.dir) {
            Ok(mut entries) => {
                entries.retain(|p| {
                    p.extension().map(|e| e.eq_ignore_ascii_case("cache")).unwrap_or(false)
                        && self.fs.is_file(p)
                });
                entries.sort();
                entries
            }
            Err(err) => {
                debug!(dir = %self.dir.display(), error = %err, "cache dir not readable");
                Vec::new()
            }
        }
    }

    /// Whether `-cache` should be passed to the editor for this run.
    pub fn should_use(&self) -> bool {
        if !self.enabled {
            return false;
        }
        let newest = self
            .cache_files()
            .iter()
            .filter_map(|p| self.fs.modified(p).ok())
            .max();

        match newest {
            Some(newest) => {
                let fresh = cache_is_fresh(newest, SystemTime::now(), self.max_age);
                debug!(fresh, max_age_hours = self.max_age.as_secs() / 3600, "editor cache checked");
                fresh
            }
            None => {
                debug!(dir = %self.dir.display(), "no editor cache files yet");
                false
            }
        }
    }

    /// Delete every cache file. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.cache_files() {
            match self.fs.remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => warn!(path = %path.display(), error = %err, "could not remove cache file"),
            }
        }
        info!(removed, dir = %self.dir.display(), "editor cache cleared");
        Ok(removed)
    }
}
