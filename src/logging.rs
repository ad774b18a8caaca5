// src/logging.rs

//! Logging setup for `autopatcher` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the log level:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `AUTOPATCHER_LOG` environment variable (e.g. "info", "debug")
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for `plan` and
//! `candidates` output. When a log file is given, every line is also teed
//! into it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Local;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "AUTOPATCHER_LOG";

/// Initialise the global logging subscriber.
///
/// If a subscriber is already installed (e.g. by a test harness) it is left
/// in place and this is a no-op.
pub fn init_logging(cli_level: Option<LogLevel>, log_file: Option<&Path>) -> Result<()> {
    let level = match cli_level {
        Some(lvl) => level_from_log_level(lvl),
        None => std::env::var(LOG_ENV_VAR)
            .ok()
            .and_then(|s| parse_level_str(&s))
            .unwrap_or(tracing::Level::INFO),
    };

    let writer = match log_file {
        Some(path) => {
            let file = open_log_file(path)?;
            BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let _ = fmt()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_ansi(log_file.is_none())
        .with_writer(writer)
        .try_init();

    Ok(())
}

/// `<output_dir>/logs/run/autopatcher_<timestamp>.log`
pub fn run_log_path(output_dir: &Path) -> PathBuf {
    output_dir
        .join("logs")
        .join("run")
        .join(format!("autopatcher_{}.log", Local::now().format("%Y%m%d_%H%M%S")))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating log dir {:?}", parent))?;
    }
    File::create(path).with_context(|| format!("creating log file {:?}", path))
}

fn level_from_log_level(lvl: LogLevel) -> tracing::Level {
    use tracing::Level;
    [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE][lvl as usize]
}

/// Parse a level name from the environment. `warning` is accepted as an
/// alias for `warn`.
pub fn parse_level_str(s: &str) -> Option<tracing::Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "warning" => Some(tracing::Level::WARN),
        other => other.parse().ok(),
    }
}
