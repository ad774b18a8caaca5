// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `autopatcher`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autopatcher",
    version,
    about = "Drive an external record editor through scripted extraction jobs and build the patcher INI.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `autopatcher.toml` in the current working directory.
    #[arg(long, global = true, value_name = "PATH", default_value = "autopatcher.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTOPATCHER_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Do not tee logs into `<output_dir>/logs/run/`.
    #[arg(long, global = true)]
    pub no_log_file: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the full pipeline: every job, classification, mapper, generation.
    Run,

    /// Run a single job by its `[Scripts]` key.
    Job {
        #[arg(value_name = "SCRIPT_KEY")]
        script_key: String,
    },

    /// Run only the strategy generator job.
    Strategy,

    /// List candidate output directories and which expected files each holds.
    Candidates,

    /// Delete the editor's load-order cache files.
    ClearCache,

    /// Print the commands each job would launch, without running anything.
    Plan,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
