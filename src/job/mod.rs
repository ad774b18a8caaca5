// src/job/mod.rs

//! Running one scripted editor job end to end.
//!
//! - [`layout`]: where the editor, scripts, data and outputs live.
//! - [`staging`]: per-run staged files and their guaranteed teardown.
//! - [`capture`]: stdout/stderr capture for direct launches.
//! - [`cache`]: whether to pass `-cache` to the editor.
//! - [`runner`]: the [`JobRunner`] state machine tying it all together.

pub mod cache;
pub mod capture;
pub mod layout;
pub mod runner;
pub mod staging;

use std::fmt;

pub use cache::EditorCache;
pub use layout::EditorLayout;
pub use runner::JobRunner;
pub use staging::RunContext;

/// Lifecycle of a single job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Preparing,
    Executing,
    Verifying,
    Collecting,
    Cleaning,
    Succeeded,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Idle => "idle",
            JobState::Preparing => "preparing",
            JobState::Executing => "executing",
            JobState::Verifying => "verifying",
            JobState::Collecting => "collecting",
            JobState::Cleaning => "cleaning",
            JobState::Succeeded => "succeeded",
            JobState::Failed => "failed",
        };
        f.write_str(s)
    }
}
