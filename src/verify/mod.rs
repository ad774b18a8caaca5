// src/verify/mod.rs

//! Layered success verification.
//!
//! The editor's own reporting is unreliable: depending on the launch mode
//! its log may be late, redirected or missing. Verification therefore walks
//! a fixed ladder of evidence, strongest first:
//!
//! 1. exit-code gate (a bad code ends verification immediately),
//! 2. primary marker in the session log (polled for a short while),
//! 3. job marker or secondary pattern in fallback log locations,
//! 4. presence of at least one expected output file.
//!
//! Each rung is a plain function of its inputs so it can be tested alone.

pub mod rules;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::collect::ArtifactCollector;
use crate::fs::FileSystem;
use crate::process::waiter::deadline_after;
use crate::types::{ProcessExit, TimeoutKind};

pub use rules::FallbackLogRule;

/// Which rung of the ladder proved success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessEvidence {
    PrimaryMarker,
    FallbackMarker(PathBuf),
    /// Tentative: collection has the final word.
    ArtifactPresence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationResult {
    Success(SuccessEvidence),
    /// `None` when the process ended without a code.
    FailureExitCode(Option<i32>),
    FailureNoMarker,
    FailureTimeout(TimeoutKind),
}

impl VerificationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationResult::Success(_))
    }

    /// True when success rests only on the artifact-presence fallback.
    pub fn is_tentative(&self) -> bool {
        matches!(
            self,
            VerificationResult::Success(SuccessEvidence::ArtifactPresence)
        )
    }
}

/// Rung 1. A non-zero or unknown exit code fails without looking further.
///
/// A discovered (non-child) process has no observable exit code; it passes
/// the gate and the later rungs decide.
pub fn check_exit_gate(exit: ProcessExit) -> Result<(), VerificationResult> {
    match exit {
        ProcessExit::Code(0) | ProcessExit::Detached => Ok(()),
        ProcessExit::Code(code) => Err(VerificationResult::FailureExitCode(Some(code))),
        ProcessExit::Terminated => Err(VerificationResult::FailureExitCode(None)),
    }
}

/// Literal substring match; an empty marker never matches.
pub fn contains_marker(text: &str, marker: &str) -> bool {
    !marker.is_empty() && text.contains(marker)
}

/// Inputs for one verification pass.
#[derive(Debug, Clone)]
pub struct VerificationInput<'a> {
    pub exit: ProcessExit,
    pub session_log: &'a Path,
    pub marker: &'a str,
    pub expected_outputs: &'a [String],
    /// Files older than this are ignored by the fallback scan.
    pub started_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct SuccessVerifier {
    fs: Arc<dyn FileSystem>,
    rules: Vec<FallbackLogRule>,
    timeout: Duration,
    poll_interval: Duration,
}

impl SuccessVerifier {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        rules: Vec<FallbackLogRule>,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            fs,
            rules,
            timeout,
            poll_interval,
        }
    }

    /// Walk the full ladder.
    pub async fn verify(
        &self,
        input: &VerificationInput<'_>,
        collector: &ArtifactCollector,
    ) -> VerificationResult {
        if let Err(failure) = check_exit_gate(input.exit) {
            warn!(exit = ?input.exit, "exit code gate failed; skipping log and artifact checks");
            return failure;
        }

        if self.scan_primary(input.session_log, input.marker).await {
            info!(log = %input.session_log.display(), "success marker found in session log");
            return VerificationResult::Success(SuccessEvidence::PrimaryMarker);
        }

        if let Some(path) = self.scan_fallback(input.marker, input.started_at) {
            info!(log = %path.display(), "success marker found in fallback log");
            return VerificationResult::Success(SuccessEvidence::FallbackMarker(path));
        }

        if !input.expected_outputs.is_empty() && collector.any_present(input.expected_outputs) {
            warn!("no success marker anywhere; proceeding on artifact presence");
            return VerificationResult::Success(SuccessEvidence::ArtifactPresence);
        }

        warn!(
            marker = input.marker,
            "no success marker or artifact evidence found"
        );
        VerificationResult::FailureNoMarker
    }

    /// Rung 2. Re-read the whole session log each poll until the marker
    /// shows up or the verification timeout elapses. Always reads at least
    /// once.
    pub async fn scan_primary(&self, log_path: &Path, marker: &str) -> bool {
        let deadline = deadline_after(self.timeout);
        loop {
            if self.fs.is_file(log_path) {
                match self.fs.read_text_lossy(log_path) {
                    Ok(text) if contains_marker(&text, marker) => return true,
                    Ok(_) => {}
                    Err(err) => debug!(log = %log_path.display(), error = %err, "session log not readable yet"),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Rung 3. One pass over every fallback rule. Returns the first log
    /// file (in rule order, then file name order) carrying evidence.
    pub fn scan_fallback(&self, marker: &str, since: SystemTime) -> Option<PathBuf> {
        for rule in &self.rules {
            if !self.fs.is_dir(&rule.dir) {
                continue;
            }
            let mut entries = match self.fs.read_dir(&rule.dir) {
                Ok(entries) => entries,
                Err(err) => {
                    debug!(dir = %rule.dir.display(), error = %err, "fallback dir not readable");
                    continue;
                }
            };
            entries.sort();

            for path in entries {
                if !rule.matches_file(&path) || !self.fs.is_file(&path) {
                    continue;
                }
                let fresh = self
                    .fs
                    .modified(&path)
                    .map(|m| rules::modified_since(m, since))
                    .unwrap_or(false);
                if !fresh {
                    continue;
                }
                match self.fs.read_text_lossy(&path) {
                    Ok(text) if rule.matches_text(&text, marker) => return Some(path),
                    Ok(_) => {}
                    Err(err) => debug!(log = %path.display(), error = %err, "fallback log not readable"),
                }
            }
        }
        None
    }
}
