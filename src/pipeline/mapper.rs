// src/pipeline/mapper.rs

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info};

use crate::errors::{PatcherError, Result};
use crate::pipeline::PipelineStep;
use crate::process::CommandLine;

/// Runs the external ammo mapping tool and waits for it.
///
/// Only the exit code decides success; the tool's output file is optional
/// input for generation.
#[derive(Debug, Clone)]
pub struct MapperStep {
    command: CommandLine,
    budget: Duration,
}

impl MapperStep {
    pub fn new(command: CommandLine, budget: Duration) -> Self {
        Self { command, budget }
    }

    /// `<mapper> --ammo-file .. --munitions-file .. --output-file .. <extra...>`
    pub fn standard_command(
        executable: &Path,
        output_dir: &Path,
        ammo_map_file: &Path,
        extra_args: &[String],
    ) -> CommandLine {
        let mut args = vec![
            "--ammo-file".to_string(),
            path_arg(output_dir.join("unique_ammo_for_mapping.ini")),
            "--munitions-file".to_string(),
            path_arg(output_dir.join("munitions_ammo_ids.ini")),
            "--output-file".to_string(),
            path_arg(ammo_map_file.to_path_buf()),
        ];
        args.extend(extra_args.iter().filter(|a| !a.trim().is_empty()).cloned());
        CommandLine::new(executable, args)
    }

    pub fn command(&self) -> &CommandLine {
        &self.command
    }

    async fn launch(&self) -> Result<bool> {
        info!(cmd = %self.command.display(), "starting mapper");

        let mut cmd = Command::new(&self.command.program);
        cmd.args(&self.command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd
            .spawn()
            .with_context(|| format!("spawning mapper {:?}", self.command.program))?;

        let output = match timeout(self.budget, child.wait_with_output()).await {
            Ok(output) => output.context("waiting for mapper")?,
            Err(_) => {
                return Err(PatcherError::ProcessTimeout {
                    target: self.command.program.display().to_string(),
                    budget_secs: self.budget.as_secs(),
                    detail: "mapper did not exit".to_string(),
                });
            }
        };

        if output.status.success() {
            info!("mapper finished");
            return Ok(true);
        }
        error!(
            exit_code = ?output.status.code(),
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "mapper failed"
        );
        Ok(false)
    }
}

fn path_arg(path: PathBuf) -> String {
    path.display().to_string()
}

impl PipelineStep for MapperStep {
    fn name(&self) -> &str {
        "mapper"
    }

    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(self.launch())
    }
}
