// src/job/runner.rs

//! Job runner.
//!
//! A job walks `Idle → Preparing → Executing → Verifying → Collecting →
//! Cleaning → Succeeded | Failed`. Cleaning always runs, whatever happened
//! before it, and [`RunContext`]'s `Drop` restores the filesystem even if
//! the run future itself is dropped mid-flight.
//!
//! Errors never escape [`JobRunner::run`]: they are logged with full context
//! and reported as `false`.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::Context;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::collect::{ArtifactCollector, CandidateSources, CollectionReport};
use crate::config::{ConfigProvider, EnvironmentSettings, JobSpec, RunSettings};
use crate::errors::{PatcherError, Result};
use crate::fs::FileSystem;
use crate::job::cache::EditorCache;
use crate::job::capture::spawn_output_capture;
use crate::job::layout::EditorLayout;
use crate::job::staging::RunContext;
use crate::job::JobState;
use crate::process::{
    direct_command, editor_args, intermediary_command, CommandLine, EditorInvocation,
    ProcessTable, ProcessWaiter,
};
use crate::types::{TimeoutKind, WaitOutcome};
use crate::verify::rules::default_rules;
use crate::verify::{FallbackLogRule, SuccessVerifier, VerificationInput, VerificationResult};

/// How long to wait for the capture tasks to drain after the editor exits.
const CAPTURE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct JobRunner {
    fs: Arc<dyn FileSystem>,
    layout: EditorLayout,
    env: EnvironmentSettings,
    settings: RunSettings,
    scripts: BTreeMap<String, String>,
    waiter: ProcessWaiter,
    verifier: SuccessVerifier,
    collector: ArtifactCollector,
    cache: EditorCache,
    state: JobState,
    history: Vec<JobState>,
}

impl JobRunner {
    /// Wire a runner from configuration.
    ///
    /// Configured `[[Verification.fallback]]` rules replace the built-in
    /// fallback locations entirely.
    pub fn from_config(
        cfg: &ConfigProvider,
        fs: Arc<dyn FileSystem>,
        table: Box<dyn ProcessTable>,
    ) -> Result<Self> {
        let layout = EditorLayout::from_provider(cfg)?;
        let env = cfg.environment_settings()?;
        let settings = cfg.run_settings();

        let rules = if cfg.fallback_rule_configs().is_empty() {
            let overwrite = env
                .overwrite_dir
                .as_deref()
                .filter(|_| env.use_intermediary);
            default_rules(&layout.logs_dir, Some(&layout.editor_dir), overwrite)
        } else {
            cfg.fallback_rule_configs()
                .iter()
                .map(|rule| FallbackLogRule::compile(rule, cfg))
                .collect::<Result<Vec<_>>>()?
        };

        let collector = ArtifactCollector::new(fs.clone(), CandidateSources::from_provider(cfg, &env)?);
        let verifier = SuccessVerifier::new(
            fs.clone(),
            rules,
            settings.verification_timeout,
            settings.poll_interval,
        );
        let waiter = ProcessWaiter::new(table, settings.poll_interval, settings.discovery_tolerance);
        let cache = EditorCache::from_provider(cfg, fs.clone(), &layout.editor_dir);

        Ok(Self {
            fs,
            layout,
            env,
            settings,
            scripts: cfg.scripts(),
            waiter,
            verifier,
            collector,
            cache,
            state: JobState::Idle,
            history: vec![JobState::Idle],
        })
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// States visited by the most recent run, in order.
    pub fn history(&self) -> &[JobState] {
        &self.history
    }

    pub fn layout(&self) -> &EditorLayout {
        &self.layout
    }

    pub fn collector(&self) -> &ArtifactCollector {
        &self.collector
    }

    pub fn cache(&self) -> &EditorCache {
        &self.cache
    }

    /// Run one job to completion. Never panics, never returns an error.
    pub async fn run(&mut self, job: &JobSpec) -> bool {
        self.state = JobState::Idle;
        self.history = vec![JobState::Idle];
        let key = job.script_key.as_str();
        info!(job = %key, "starting job");

        let script = match self.script_for(key) {
            Ok(script) => script,
            Err(err) => {
                error!(job = %key, error = %err, "job failed before staging");
                self.transition(key, JobState::Failed);
                return false;
            }
        };

        let mut ctx = RunContext::new(self.fs.clone(), &self.layout, key, &script);
        let result = self.run_phases(job, &mut ctx).await;

        self.transition(key, JobState::Cleaning);
        self.cleanup(&mut ctx).await;

        let ok = match result {
            Ok(()) => true,
            Err(err) => {
                error!(job = %key, error = %format!("{err:#}"), "job failed");
                false
            }
        };

        self.transition(key, if ok { JobState::Succeeded } else { JobState::Failed });
        ok
    }

    /// The command `job` would launch, without touching the disk.
    pub fn plan(&self, job: &JobSpec) -> Result<CommandLine> {
        let script = self.script_for(&job.script_key)?;
        let mut ctx = RunContext::new(self.fs.clone(), &self.layout, &job.script_key, &script);
        let command = self.build_command(&ctx, self.cache.should_use());
        ctx.restore_filesystem();
        command
    }

    fn script_for(&self, key: &str) -> Result<String> {
        self.scripts.get(key).cloned().ok_or_else(|| {
            PatcherError::ConfigError(format!("[Scripts].{key} is not configured"))
        })
    }

    fn transition(&mut self, job: &str, next: JobState) {
        debug!(job = %job, from = %self.state, to = %next, "job state transition");
        self.state = next;
        self.history.push(next);
    }

    async fn run_phases(&mut self, job: &JobSpec, ctx: &mut RunContext) -> Result<()> {
        let key = job.script_key.as_str();

        self.transition(key, JobState::Preparing);
        self.prepare(ctx)?;

        self.transition(key, JobState::Executing);
        let outcome = self.execute(ctx).await?;

        self.transition(key, JobState::Verifying);
        let exit = match outcome {
            WaitOutcome::Exited(exit) => exit,
            WaitOutcome::TimedOut(kind) => {
                ctx.target_may_be_running = kind == TimeoutKind::NeverExited;
                let verdict = VerificationResult::FailureTimeout(kind);
                warn!(job = %key, verdict = ?verdict, "editor wait timed out");
                self.salvage(job);
                return Err(PatcherError::ProcessTimeout {
                    target: self.layout.editor_image_name(),
                    budget_secs: self.settings.execution_timeout.as_secs(),
                    detail: match kind {
                        TimeoutKind::NeverAppeared => "process never appeared".to_string(),
                        TimeoutKind::NeverExited => "process never exited".to_string(),
                    },
                });
            }
        };

        let input = VerificationInput {
            exit,
            session_log: &ctx.session_log_path,
            marker: &job.success_marker,
            expected_outputs: &job.expected_outputs,
            started_at: ctx.started_at,
        };
        let verdict = self.verifier.verify(&input, &self.collector).await;
        if !verdict.is_success() {
            return Err(PatcherError::VerificationFailure(format!("{verdict:?}")));
        }

        if job.expected_outputs.is_empty() {
            debug!(job = %key, "job declares no outputs; nothing to collect");
            return Ok(());
        }

        self.transition(key, JobState::Collecting);
        let report = self.collector.collect(&job.expected_outputs);
        log_report(key, &report);
        if !report.is_complete() {
            if verdict.is_tentative() || self.settings.strict_collection {
                return Err(PatcherError::CollectionFailure {
                    missing: report.missing,
                });
            }
            warn!(
                job = %key,
                missing = ?report.missing,
                "marker confirmed success but some outputs were not collected"
            );
        }
        Ok(())
    }

    fn prepare(&mut self, ctx: &mut RunContext) -> Result<()> {
        let marker = self.layout.game_data_path.join(&self.layout.game_data_marker);
        if !self.fs.is_file(&marker) {
            return Err(PatcherError::PreparationError(format!(
                "game data path {} does not contain {}",
                self.layout.game_data_path.display(),
                self.layout.game_data_marker
            )));
        }

        self.fs
            .create_dir_all(&self.layout.logs_dir)
            .map_err(|e| PatcherError::PreparationError(format!("{e:#}")))?;

        ctx.stage_script()
            .map_err(|e| PatcherError::PreparationError(format!("{e:#}")))?;
        ctx.stage_library(&self.layout.library_source(), &self.layout.library_destinations())
            .map_err(|e| PatcherError::PreparationError(format!("{e:#}")))?;
        Ok(())
    }

    async fn execute(&mut self, ctx: &mut RunContext) -> Result<WaitOutcome> {
        let command = self.build_command(ctx, self.cache.should_use())?;
        let budget = self.settings.execution_timeout;
        info!(job = %ctx.job_key, cmd = %command.display(), "launching editor");

        if self.env.use_intermediary {
            let launched_at = SystemTime::now();
            let launcher = command
                .to_command()
                .spawn()
                .with_context(|| format!("spawning launcher {:?}", command.program))?;
            debug!(job = %ctx.job_key, pid = ?launcher.id(), "launcher started");
            ctx.launcher = Some(launcher);

            let target = self.layout.editor_image_name();
            let (outcome, found) = self
                .waiter
                .discover_and_wait(&target, launched_at, budget)
                .await;
            ctx.discovered = found;
            return Ok(outcome);
        }

        let mut cmd = command.to_command();
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning editor {:?}", command.program))?;
        let capture = spawn_output_capture(&ctx.job_key, &mut child, ctx.capture_log_path.clone());

        let child = ctx.direct_child.insert(child);
        let outcome = self.waiter.wait_direct(child, budget).await?;

        if let (WaitOutcome::Exited(_), Some(handle)) = (outcome, capture) {
            if timeout(CAPTURE_DRAIN_TIMEOUT, handle).await.is_err() {
                debug!(job = %ctx.job_key, "output capture still draining; continuing");
            }
        }
        Ok(outcome)
    }

    /// Editor command for this run. Direct launches get the staged script's
    /// full path; through the launcher only its file name is passed because
    /// the launcher's virtual filesystem resolves it inside `-S:`.
    fn build_command(&self, ctx: &RunContext, use_cache: bool) -> Result<CommandLine> {
        let script_arg = if self.env.use_intermediary {
            ctx.staged_file_name()
        } else {
            ctx.staged_script_path.display().to_string()
        };
        let inv = EditorInvocation {
            script_arg,
            script_dir: &self.layout.edit_scripts_dir,
            log_path: &ctx.session_log_path,
            game_data_path: &self.layout.game_data_path,
            game_variant_flag: self.layout.game_variant_flag.as_deref(),
            unsafe_edit_flags: &self.layout.unsafe_edit_flags,
            use_cache,
        };

        if self.env.use_intermediary {
            intermediary_command(&self.env, editor_args(&inv))
        } else {
            Ok(direct_command(&self.layout.editor_executable, &inv))
        }
    }

    /// Best-effort collection after a timeout; never changes the outcome.
    fn salvage(&mut self, job: &JobSpec) {
        if job.expected_outputs.is_empty() {
            return;
        }
        self.transition(&job.script_key, JobState::Collecting);
        let report = self.collector.collect(&job.expected_outputs);
        info!(
            job = %job.script_key,
            salvaged = report.collected.len(),
            missing = report.missing.len(),
            "salvage collection after timeout"
        );
    }

    /// Stop anything still running, then undo staging.
    async fn cleanup(&mut self, ctx: &mut RunContext) {
        if let Some(mut child) = ctx.direct_child.take() {
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => match child.kill().await {
                    Ok(()) => info!(job = %ctx.job_key, "killed editor process still running after timeout"),
                    Err(err) => warn!(
                        job = %ctx.job_key,
                        error = %err,
                        "cleanup warning: could not kill editor process"
                    ),
                },
            }
        }

        if let Some(found) = ctx.discovered.take() {
            if ctx.target_may_be_running {
                if self.waiter.kill(found.pid) {
                    info!(job = %ctx.job_key, pid = found.pid, "killed discovered editor process");
                } else {
                    warn!(
                        job = %ctx.job_key,
                        pid = found.pid,
                        "cleanup warning: could not kill discovered editor process"
                    );
                }
            }
        }

        // Launcher is fire-and-forget; dropping the handle does not kill it.
        ctx.launcher.take();
        ctx.restore_filesystem();
    }
}

fn log_report(job: &str, report: &CollectionReport) {
    for artifact in &report.collected {
        debug!(
            job = %job,
            file = %artifact.name,
            from = %artifact.source.display(),
            "artifact collected"
        );
    }
    info!(
        job = %job,
        collected = report.collected.len(),
        missing = report.missing.len(),
        "collection finished"
    );
}
