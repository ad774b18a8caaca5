// src/pipeline/lock.rs

//! Single-flight guard.
//!
//! Two pipelines sharing an editor would clobber each other's staged
//! scripts and library swaps. The lock is a file created with `create_new`
//! holding the owner's PID; it is removed on drop. A lock whose PID is no
//! longer running is stale and reclaimed once.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::{PatcherError, Result};
use crate::process::ProcessTable;

pub const LOCK_FILE_NAME: &str = ".autopatcher.lock";

#[derive(Debug)]
pub struct PipelineLock {
    path: PathBuf,
}

impl PipelineLock {
    /// Take the lock in `dir`, creating the directory if needed.
    pub fn acquire(dir: &Path, table: &mut dyn ProcessTable) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        match Self::try_create(&path) {
            Ok(lock) => return Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(err.into()),
        }

        if !Self::is_stale(&path, table) {
            return Err(PatcherError::Locked(path));
        }

        warn!(path = %path.display(), "reclaiming stale pipeline lock");
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        match Self::try_create(&path) {
            Ok(lock) => Ok(lock),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(PatcherError::Locked(path)),
            Err(err) => Err(err.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn try_create(path: &Path) -> std::io::Result<Self> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        writeln!(file, "{}", std::process::id())?;
        debug!(path = %path.display(), "pipeline lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Stale means: unreadable PID, or a PID that is not running. Our own
    /// PID is never stale.
    fn is_stale(path: &Path, table: &mut dyn ProcessTable) -> bool {
        let Ok(text) = fs::read_to_string(path) else {
            return false;
        };
        let Ok(pid) = text.trim().parse::<u32>() else {
            info!(path = %path.display(), "lock file holds no pid");
            return true;
        };
        if pid == std::process::id() {
            return false;
        }
        matches!(table.is_running(pid), Ok(false))
    }
}

impl Drop for PipelineLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %err, "could not remove pipeline lock");
        }
    }
}
