// src/lib.rs

pub mod cli;
pub mod collect;
pub mod config;
pub mod errors;
pub mod fs;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod types;
pub mod verify;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::cli::{CliArgs, Command, LogLevel};
use crate::config::provider::SECTION_PATHS;
use crate::config::{load_and_validate, strategy_job, ConfigProvider, JobSpec};
use crate::errors::{PatcherError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::job::JobRunner;
use crate::pipeline::{standard_steps, JobStep, Pipeline, PipelineStep};
use crate::process::SysinfoProcessTable;

/// Process exit code for a fully successful command.
pub const EXIT_OK: i32 = 0;
/// A job or pipeline step failed.
pub const EXIT_FAILURE: i32 = 1;
/// The configuration could not be loaded or is structurally invalid.
pub const EXIT_CONFIG: i32 = 2;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// This wires together:
/// - config loading and validation
/// - logging (stderr, plus a per-run log file under the output dir)
/// - the selected subcommand
pub async fn run(args: CliArgs) -> i32 {
    let config_path = PathBuf::from(&args.config);
    let cfg = match load_and_validate(&config_path) {
        Ok(cfg) => cfg,
        Err(err) => {
            init_stderr_logging(args.log_level);
            error!(config = %config_path.display(), error = %err, "cannot load configuration");
            return EXIT_CONFIG;
        }
    };

    let log_file = if args.no_log_file {
        None
    } else {
        cfg.resolve_path(SECTION_PATHS, "output_dir")
            .ok()
            .map(|dir| logging::run_log_path(&dir))
    };
    if let Err(err) = logging::init_logging(args.log_level, log_file.as_deref()) {
        eprintln!("autopatcher: log file disabled: {err:#}");
        init_stderr_logging(args.log_level);
    }

    match execute(&args.command, &cfg).await {
        Ok(true) => EXIT_OK,
        Ok(false) => EXIT_FAILURE,
        Err(err @ PatcherError::ConfigError(_)) => {
            error!(error = %err, "configuration error");
            EXIT_CONFIG
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            EXIT_FAILURE
        }
    }
}

fn init_stderr_logging(level: Option<LogLevel>) {
    if let Err(err) = logging::init_logging(level, None) {
        eprintln!("autopatcher: logging unavailable: {err:#}");
    }
}

/// Run one subcommand against a validated config.
pub async fn execute(command: &Command, cfg: &ConfigProvider) -> Result<bool> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);

    match command {
        Command::Run => {
            let runner = shared_runner(cfg, fs.clone())?;
            let steps = standard_steps(cfg, fs, runner)?;
            Ok(locked_pipeline(cfg, steps)?.run().await)
        }
        Command::Job { script_key } => {
            let job = find_job(cfg, script_key)?;
            let runner = shared_runner(cfg, fs)?;
            let steps: Vec<Box<dyn PipelineStep>> = vec![Box::new(JobStep::new(runner, job))];
            Ok(locked_pipeline(cfg, steps)?.run().await)
        }
        Command::Strategy => {
            let runner = shared_runner(cfg, fs)?;
            let steps: Vec<Box<dyn PipelineStep>> =
                vec![Box::new(JobStep::new(runner, strategy_job()))];
            Ok(locked_pipeline(cfg, steps)?.run().await)
        }
        Command::Candidates => {
            print_candidates(cfg, fs)?;
            Ok(true)
        }
        Command::ClearCache => {
            let runner = JobRunner::from_config(cfg, fs, Box::new(SysinfoProcessTable::new()))?;
            let removed = runner.cache().clear()?;
            println!(
                "removed {removed} cache file(s) from {}",
                runner.cache().dir().display()
            );
            Ok(true)
        }
        Command::Plan => {
            print_plan(cfg, fs)?;
            Ok(true)
        }
    }
}

/// A configured job, or a bare job for any other `[Scripts]` key (such as
/// the strategy generator).
fn find_job(cfg: &ConfigProvider, script_key: &str) -> Result<JobSpec> {
    if let Some(job) = cfg.jobs().into_iter().find(|j| j.script_key == script_key) {
        return Ok(job);
    }
    let strategy = strategy_job();
    if strategy.script_key == script_key {
        return Ok(strategy);
    }
    Err(PatcherError::ConfigError(format!(
        "no job named '{script_key}' in [[Jobs]]"
    )))
}

fn shared_runner(cfg: &ConfigProvider, fs: Arc<dyn FileSystem>) -> Result<Arc<Mutex<JobRunner>>> {
    let runner = JobRunner::from_config(cfg, fs, Box::new(SysinfoProcessTable::new()))?;
    Ok(Arc::new(Mutex::new(runner)))
}

fn locked_pipeline(cfg: &ConfigProvider, steps: Vec<Box<dyn PipelineStep>>) -> Result<Pipeline> {
    let output_dir = cfg.resolve_path(SECTION_PATHS, "output_dir")?;
    let pipeline = Pipeline::new(steps).with_lock(output_dir, Box::new(SysinfoProcessTable::new()));
    info!(steps = ?pipeline.step_names(), "pipeline assembled");
    Ok(pipeline)
}

fn print_candidates(cfg: &ConfigProvider, fs: Arc<dyn FileSystem>) -> Result<()> {
    let runner = JobRunner::from_config(cfg, fs.clone(), Box::new(SysinfoProcessTable::new()))?;
    let collector = runner.collector();
    let expected: Vec<String> = cfg
        .jobs()
        .into_iter()
        .flat_map(|j| j.expected_outputs)
        .collect();

    println!("candidate output directories (priority order):");
    let dirs = collector.candidate_output_dirs();
    if dirs.is_empty() {
        println!("  (none exist yet)");
    }
    for dir in dirs {
        println!("  {}", dir.display());
        for name in &expected {
            if fs.is_file(&dir.join(name)) {
                println!("      {name}");
            }
        }
    }
    Ok(())
}

fn print_plan(cfg: &ConfigProvider, fs: Arc<dyn FileSystem>) -> Result<()> {
    let runner = JobRunner::from_config(cfg, fs, Box::new(SysinfoProcessTable::new()))?;
    println!("autopatcher plan");
    println!("  editor: {}", runner.layout().editor_executable.display());
    println!("  output: {}", runner.layout().output_dir.display());
    println!();

    for job in cfg.jobs() {
        println!("  - {}", job.script_key);
        println!("      cmd: {}", runner.plan(&job)?.display());
        if !job.expected_outputs.is_empty() {
            println!("      outputs: {:?}", job.expected_outputs);
        }
    }
    Ok(())
}
