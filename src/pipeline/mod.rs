// src/pipeline/mod.rs

//! Sequential pipeline of steps.
//!
//! - [`PipelineStep`] is the seam: jobs, the classification pass, the mapper
//!   and the INI generator all implement it, and tests plug in fakes.
//! - [`Pipeline::run`] stops at the first step that reports `false` or
//!   errors. Nothing already done is rolled back.
//! - A [`PipelineLock`] keeps two pipelines off the same editor.

pub mod classify;
pub mod generate;
pub mod lock;
pub mod mapper;
pub mod records;

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::provider::{SECTION_PARAMETERS, SECTION_PATHS};
use crate::config::{ConfigProvider, JobSpec};
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::job::JobRunner;
use crate::process::ProcessTable;

pub use classify::ClassificationStep;
pub use generate::GenerationStep;
pub use lock::PipelineLock;
pub use mapper::MapperStep;

/// One unit of pipeline work.
///
/// `Ok(false)` is an ordinary failure (already logged by the step); `Err` is
/// an unexpected error the pipeline logs on the step's behalf.
pub trait PipelineStep: Send {
    fn name(&self) -> &str;

    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>>;
}

/// An editor job as a pipeline step. Jobs share one runner.
#[derive(Debug, Clone)]
pub struct JobStep {
    runner: Arc<Mutex<JobRunner>>,
    job: JobSpec,
}

impl JobStep {
    pub fn new(runner: Arc<Mutex<JobRunner>>, job: JobSpec) -> Self {
        Self { runner, job }
    }
}

impl PipelineStep for JobStep {
    fn name(&self) -> &str {
        &self.job.script_key
    }

    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move {
            let mut runner = self.runner.lock().await;
            Ok(runner.run(&self.job).await)
        })
    }
}

pub struct Pipeline {
    steps: Vec<Box<dyn PipelineStep>>,
    lock: Option<(PathBuf, Box<dyn ProcessTable>)>,
}

impl Pipeline {
    pub fn new(steps: Vec<Box<dyn PipelineStep>>) -> Self {
        Self { steps, lock: None }
    }

    /// Hold the single-flight lock in `dir` for the duration of [`run`].
    ///
    /// [`run`]: Pipeline::run
    pub fn with_lock(mut self, dir: PathBuf, table: Box<dyn ProcessTable>) -> Self {
        self.lock = Some((dir, table));
        self
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step in order. True only if all of them succeeded.
    pub async fn run(&mut self) -> bool {
        let _guard = match self.lock.as_mut() {
            Some((dir, table)) => match PipelineLock::acquire(dir, table.as_mut()) {
                Ok(guard) => Some(guard),
                Err(err) => {
                    error!(error = %err, "cannot start pipeline");
                    return false;
                }
            },
            None => None,
        };

        let total = self.steps.len();
        for (index, step) in self.steps.iter_mut().enumerate() {
            let name = step.name().to_string();
            info!(step = %name, index = index + 1, total, "starting pipeline step");

            match step.run().await {
                Ok(true) => info!(step = %name, "pipeline step succeeded"),
                Ok(false) => {
                    error!(step = %name, "pipeline step failed; aborting");
                    return false;
                }
                Err(err) => {
                    error!(step = %name, error = %format!("{err:#}"), "pipeline step errored; aborting");
                    return false;
                }
            }
        }

        info!(steps = total, "pipeline completed");
        true
    }
}

pub const DEFAULT_STRATEGY_FILENAME: &str = "strategy.json";
pub const DEFAULT_AMMO_MAP_FILENAME: &str = "ammo_map.ini";
pub const WEAPON_DATA_FILENAME: &str = "weapon_ammo_map.json";

/// Steps of a full run: every configured job, then classification, the
/// mapper (when configured) and generation.
pub fn standard_steps(
    cfg: &ConfigProvider,
    fs: Arc<dyn FileSystem>,
    runner: Arc<Mutex<JobRunner>>,
) -> Result<Vec<Box<dyn PipelineStep>>> {
    let output_dir = cfg.resolve_path(SECTION_PATHS, "output_dir")?;
    let strategy_file = cfg
        .resolve_optional_path(SECTION_PATHS, "strategy_file")
        .unwrap_or_else(|| cfg.project_root().join(DEFAULT_STRATEGY_FILENAME));
    let ammo_map_file = cfg
        .resolve_optional_path(SECTION_PATHS, "ammo_map_file")
        .unwrap_or_else(|| output_dir.join(DEFAULT_AMMO_MAP_FILENAME));
    let weapon_data = output_dir.join(WEAPON_DATA_FILENAME);
    let patcher_dir = cfg.resolve_path(SECTION_PATHS, "robco_patcher_dir")?;
    let output_file = patcher_dir.join(cfg.resolve_string(
        SECTION_PARAMETERS,
        "robco_output_filename",
        generate::DEFAULT_OUTPUT_FILENAME,
    ));

    let mut steps: Vec<Box<dyn PipelineStep>> = cfg
        .jobs()
        .into_iter()
        .map(|job| Box::new(JobStep::new(runner.clone(), job)) as Box<dyn PipelineStep>)
        .collect();

    steps.push(Box::new(ClassificationStep::new(
        fs.clone(),
        weapon_data.clone(),
        strategy_file.clone(),
        cfg.resolve_string(
            SECTION_PARAMETERS,
            "default_ammo_category",
            classify::DEFAULT_AMMO_CATEGORY,
        ),
    )));

    match cfg.resolve_optional_path(SECTION_PATHS, "mapper_executable") {
        Some(executable) => {
            let extra = cfg.resolve_string_list(SECTION_PARAMETERS, "mapper_args", &[]);
            let command =
                MapperStep::standard_command(&executable, &output_dir, &ammo_map_file, &extra);
            steps.push(Box::new(MapperStep::new(
                command,
                cfg.run_settings().mapper_timeout,
            )));
        }
        None => info!("no [Paths].mapper_executable configured; mapper step skipped"),
    }

    steps.push(Box::new(GenerationStep::new(
        fs,
        strategy_file,
        weapon_data,
        Some(ammo_map_file),
        output_file,
    )));

    Ok(steps)
}
