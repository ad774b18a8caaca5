#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::Result;

use autopatcher::fs::{FileSystem, RealFileSystem};
use autopatcher::process::{ProcessInfo, ProcessTable, ProcessTableError};

type Snapshot = std::result::Result<Vec<ProcessInfo>, ProcessTableError>;

#[derive(Debug, Default)]
struct TableState {
    /// Played back in order; the last one repeats forever.
    snapshots: VecDeque<Snapshot>,
    /// pid → number of `is_running` polls that still answer "running".
    alive_polls: HashMap<u32, usize>,
    snapshot_calls: usize,
    killed: Vec<u32>,
}

/// Scripted [`ProcessTable`].
///
/// Cloning shares state, so a test can keep a handle after boxing one copy
/// into the code under test.
#[derive(Debug, Clone, Default)]
pub struct FakeProcessTable {
    state: Arc<Mutex<TableState>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table that never shows any process.
    pub fn empty() -> Self {
        let table = Self::new();
        table.push_snapshot(Ok(Vec::new()));
        table
    }

    pub fn push_snapshot(&self, snapshot: Snapshot) -> &Self {
        self.state.lock().unwrap().snapshots.push_back(snapshot);
        self
    }

    /// `pid` answers "running" for the next `polls` calls to `is_running`.
    pub fn keep_alive(&self, pid: u32, polls: usize) -> &Self {
        self.state.lock().unwrap().alive_polls.insert(pid, polls);
        self
    }

    pub fn snapshot_calls(&self) -> usize {
        self.state.lock().unwrap().snapshot_calls
    }

    pub fn killed(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn boxed(&self) -> Box<dyn ProcessTable> {
        Box::new(self.clone())
    }
}

impl ProcessTable for FakeProcessTable {
    fn snapshot(&mut self) -> Snapshot {
        let mut state = self.state.lock().unwrap();
        state.snapshot_calls += 1;
        if state.snapshots.len() > 1 {
            return state.snapshots.pop_front().unwrap_or(Ok(Vec::new()));
        }
        state.snapshots.front().cloned().unwrap_or(Ok(Vec::new()))
    }

    fn is_running(&mut self, pid: u32) -> std::result::Result<bool, ProcessTableError> {
        let mut state = self.state.lock().unwrap();
        match state.alive_polls.get_mut(&pid) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn kill(&mut self, pid: u32) -> bool {
        let mut state = self.state.lock().unwrap();
        state.killed.push(pid);
        state.alive_polls.remove(&pid).is_some()
    }
}

/// A process row for the fake table.
pub fn process(pid: u32, name: &str, started_at: SystemTime) -> ProcessInfo {
    ProcessInfo {
        pid,
        name: name.to_string(),
        exe: None,
        started_at,
    }
}

/// Real filesystem with injectable faults and counters.
#[derive(Debug, Default)]
pub struct FaultyFs {
    inner: RealFileSystem,
    /// Copies whose source file name contains this are truncated.
    truncate_copies_of: Mutex<Option<String>>,
    reads: AtomicUsize,
}

impl FaultyFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies of `name` silently write only half the bytes.
    pub fn truncate_copies_of(self, name: &str) -> Self {
        *self.truncate_copies_of.lock().unwrap() = Some(name.to_string());
        self
    }

    /// Number of `read_text_lossy` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn should_truncate(&self, from: &Path) -> bool {
        let guard = self.truncate_copies_of.lock().unwrap();
        match (guard.as_deref(), from.file_name()) {
            (Some(needle), Some(name)) => name.to_string_lossy().contains(needle),
            _ => false,
        }
    }
}

impl FileSystem for FaultyFs {
    fn read_text_lossy(&self, path: &Path) -> Result<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read_text_lossy(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.inner.write(path, contents)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.inner.is_file(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.is_dir(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf> {
        self.inner.canonicalize(path)
    }

    fn modified(&self, path: &Path) -> Result<SystemTime> {
        self.inner.modified(path)
    }

    fn file_len(&self, path: &Path) -> Result<u64> {
        self.inner.file_len(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> Result<u64> {
        if self.should_truncate(from) {
            let bytes = std::fs::read(from)?;
            let half = &bytes[..bytes.len() / 2];
            std::fs::write(to, half)?;
            return Ok(half.len() as u64);
        }
        self.inner.copy_file(from, to)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        self.inner.remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.remove_dir_all(path)
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.inner.create_dir_all(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        self.inner.read_dir(path)
    }
}
