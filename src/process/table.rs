// src/process/table.rs

//! OS process table access.
//!
//! The indirect-discovery protocol needs to see *every* process on the
//! machine, not just our children, because the intermediary launcher may
//! start the editor through any number of shells. [`ProcessTable`] is the
//! seam; [`SysinfoProcessTable`] is the production implementation and tests
//! provide a scripted fake.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use thiserror::Error;

/// A row of the process table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    /// Image name as reported by the OS (may be truncated on some platforms).
    pub name: String,
    pub exe: Option<PathBuf>,
    pub started_at: SystemTime,
}

impl ProcessInfo {
    /// Whether this process is an instance of `target` (an executable path
    /// or bare file name).
    ///
    /// Comparison is case-insensitive and ignores a trailing `.exe`, and
    /// considers both the reported image name and the executable path.
    pub fn matches_image(&self, target: &str) -> bool {
        let wanted = normalize_image_name(target);
        if wanted.is_empty() {
            return false;
        }
        if normalize_image_name(&self.name) == wanted {
            return true;
        }
        self.exe
            .as_deref()
            .map(|exe| normalize_image_name(&exe.to_string_lossy()) == wanted)
            .unwrap_or(false)
    }
}

/// Lower-cased file name without directory and without a `.exe` suffix.
pub fn normalize_image_name(raw: &str) -> String {
    let file = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let lower = file.trim().to_lowercase();
    match lower.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => lower,
    }
}

/// Errors raised while reading the process table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessTableError {
    #[error("permission denied while inspecting process {0}")]
    PermissionDenied(u32),

    #[error("process {0} vanished during inspection")]
    Vanished(u32),

    #[error("process table snapshot failed: {0}")]
    Unavailable(String),

    #[error("process enumeration is not supported on this platform")]
    Unsupported,
}

impl ProcessTableError {
    /// Retry policy for the poll loops.
    ///
    /// Transient errors are races with other processes starting, exiting or
    /// being protected; the loop logs them and tries again on the next tick
    /// until its deadline. Non-transient errors end the loop immediately
    /// because no amount of polling will fix them.
    pub fn is_transient(&self) -> bool {
        !matches!(self, ProcessTableError::Unsupported)
    }
}

/// Read access to the OS process table plus the one mutation cleanup needs.
pub trait ProcessTable: Send + Sync + Debug {
    /// All processes currently known to the OS.
    fn snapshot(&mut self) -> Result<Vec<ProcessInfo>, ProcessTableError>;

    /// Whether `pid` is still alive (zombies count as exited).
    fn is_running(&mut self, pid: u32) -> Result<bool, ProcessTableError>;

    /// Best-effort termination. Returns true if a signal was delivered.
    fn kill(&mut self, pid: u32) -> bool;
}

/// [`ProcessTable`] backed by the `sysinfo` crate.
#[derive(Debug)]
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn snapshot(&mut self) -> Result<Vec<ProcessInfo>, ProcessTableError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessTableError::Unsupported);
        }

        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let processes = self.system.processes();
        if processes.is_empty() {
            return Err(ProcessTableError::Unavailable(
                "empty process list".to_string(),
            ));
        }

        Ok(processes
            .iter()
            .filter(|(_, p)| p.status() != ProcessStatus::Zombie)
            .map(|(pid, p)| ProcessInfo {
                pid: pid.as_u32(),
                name: p.name().to_string_lossy().into_owned(),
                exe: p.exe().map(Path::to_path_buf),
                started_at: UNIX_EPOCH + Duration::from_secs(p.start_time()),
            })
            .collect())
    }

    fn is_running(&mut self, pid: u32) -> Result<bool, ProcessTableError> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(ProcessTableError::Unsupported);
        }

        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Ok(self
            .system
            .process(pid)
            .map(|p| p.status() != ProcessStatus::Zombie)
            .unwrap_or(false))
    }

    fn kill(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.kill()).unwrap_or(false)
    }
}
