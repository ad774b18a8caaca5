// src/process/waiter.rs

//! Bounded waiting on the editor process.
//!
//! Two protocols:
//!
//! - **direct child**: we spawned the editor ourselves and can wait on its
//!   handle and read its exit code;
//! - **indirect discovery**: an intermediary launcher spawned it. We poll
//!   the whole process table for a freshly started process with the right
//!   image name, then poll that pid until it disappears.
//!
//! Neither protocol kills anything on timeout. Termination belongs to the
//! job runner's cleanup phase so partial output can be salvaged first.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::process::Child;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::process::table::{ProcessInfo, ProcessTable};
use crate::types::{ProcessExit, TimeoutKind, WaitOutcome};

/// Pick the process the launcher started for us.
///
/// A candidate must match `target` by image name and must have been created
/// no earlier than `launched_at - tolerance`, rounded down to the whole
/// second. The OS creation timestamp is only second-granular, so an editor
/// started in the same second as the launch reports an earlier time than
/// our clock reading. Among candidates the earliest-created wins; equal
/// creation times keep enumeration order.
pub fn select_target_process<'a>(
    processes: &'a [ProcessInfo],
    target: &str,
    launched_at: SystemTime,
    tolerance: Duration,
) -> Option<&'a ProcessInfo> {
    let not_before = floor_to_second(launched_at.checked_sub(tolerance).unwrap_or(UNIX_EPOCH));
    processes
        .iter()
        .filter(|p| p.matches_image(target))
        .filter(|p| p.started_at >= not_before)
        .min_by_key(|p| p.started_at)
}

fn floor_to_second(t: SystemTime) -> SystemTime {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => UNIX_EPOCH + Duration::from_secs(since.as_secs()),
        Err(_) => UNIX_EPOCH,
    }
}

/// Deadline `budget` from now. Budgets too large for the clock saturate to
/// roughly thirty years out.
pub fn deadline_after(budget: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(budget)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}

/// Polls the process table and waits on process handles with deadlines.
#[derive(Debug)]
pub struct ProcessWaiter {
    table: Box<dyn ProcessTable>,
    poll_interval: Duration,
    tolerance: Duration,
}

impl ProcessWaiter {
    pub fn new(table: Box<dyn ProcessTable>, poll_interval: Duration, tolerance: Duration) -> Self {
        Self {
            table,
            poll_interval,
            tolerance,
        }
    }

    /// Wait for a direct child within `budget`.
    ///
    /// On timeout the child keeps running; the caller decides when to kill it.
    pub async fn wait_direct(&self, child: &mut Child, budget: Duration) -> Result<WaitOutcome> {
        let pid = child.id();
        match timeout(budget, child.wait()).await {
            Ok(status) => {
                let status = status.context("waiting for editor process")?;
                let exit = match status.code() {
                    Some(code) => ProcessExit::Code(code),
                    None => ProcessExit::Terminated,
                };
                info!(?pid, ?exit, "editor process exited");
                Ok(WaitOutcome::Exited(exit))
            }
            Err(_) => {
                warn!(
                    ?pid,
                    budget_secs = budget.as_secs(),
                    "editor process did not exit within budget"
                );
                Ok(WaitOutcome::TimedOut(TimeoutKind::NeverExited))
            }
        }
    }

    /// Poll the process table until a process matching `target` appears or
    /// `deadline` passes.
    pub async fn discover(
        &mut self,
        target: &str,
        launched_at: SystemTime,
        deadline: Instant,
    ) -> Option<ProcessInfo> {
        let mut polls: u64 = 0;
        loop {
            polls += 1;
            match self.table.snapshot() {
                Ok(processes) => {
                    if let Some(found) =
                        select_target_process(&processes, target, launched_at, self.tolerance)
                    {
                        info!(
                            image = %target,
                            pid = found.pid,
                            polls,
                            "discovered editor process started by launcher"
                        );
                        return Some(found.clone());
                    }
                }
                Err(err) if err.is_transient() => {
                    debug!(image = %target, error = %err, "transient process table error; retrying");
                }
                Err(err) => {
                    warn!(image = %target, error = %err, "process table unusable; giving up discovery");
                    return None;
                }
            }

            if !self.sleep_until_next_poll(deadline).await {
                debug!(image = %target, polls, "discovery deadline reached");
                return None;
            }
        }
    }

    /// Poll a discovered (non-child) pid until it disappears or `deadline`
    /// passes.
    pub async fn wait_discovered(&mut self, pid: u32, deadline: Instant) -> WaitOutcome {
        loop {
            match self.table.is_running(pid) {
                Ok(false) => {
                    info!(pid, "discovered editor process exited");
                    return WaitOutcome::Exited(ProcessExit::Detached);
                }
                Ok(true) => {}
                Err(err) if err.is_transient() => {
                    debug!(pid, error = %err, "transient process table error; still waiting");
                }
                Err(err) => {
                    warn!(pid, error = %err, "cannot observe discovered process any more");
                    return WaitOutcome::Exited(ProcessExit::Detached);
                }
            }

            if !self.sleep_until_next_poll(deadline).await {
                warn!(pid, "discovered editor process did not exit before deadline");
                return WaitOutcome::TimedOut(TimeoutKind::NeverExited);
            }
        }
    }

    /// Full indirect protocol: discovery followed by waiting, sharing one
    /// budget. Returns the discovered process (if any) so cleanup can kill it.
    pub async fn discover_and_wait(
        &mut self,
        target: &str,
        launched_at: SystemTime,
        budget: Duration,
    ) -> (WaitOutcome, Option<ProcessInfo>) {
        let deadline = deadline_after(budget);
        match self.discover(target, launched_at, deadline).await {
            Some(found) => {
                let outcome = self.wait_discovered(found.pid, deadline).await;
                (outcome, Some(found))
            }
            None => {
                warn!(
                    image = %target,
                    budget_secs = budget.as_secs(),
                    "editor process never appeared in the process table"
                );
                (WaitOutcome::TimedOut(TimeoutKind::NeverAppeared), None)
            }
        }
    }

    /// Terminate a discovered process. Used by cleanup only.
    pub fn kill(&mut self, pid: u32) -> bool {
        self.table.kill(pid)
    }

    /// Sleep one poll interval, clamped to the deadline. Returns false once
    /// the deadline has passed.
    async fn sleep_until_next_poll(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let remaining = deadline - now;
        sleep(self.poll_interval.min(remaining)).await;
        true
    }
}
