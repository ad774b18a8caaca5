// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Most internals use `anyhow::Context` for readable messages and convert
//! into [`PatcherError`] at module boundaries. The job runner and pipeline
//! never surface these to callers: they log them and report `false`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatcherError {
    /// A structurally required key or path is missing or unusable.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Staging or pre-launch validation failed.
    #[error("Preparation error: {0}")]
    PreparationError(String),

    #[error("Process '{target}' did not finish within {budget_secs}s ({detail})")]
    ProcessTimeout {
        target: String,
        budget_secs: u64,
        detail: String,
    },

    #[error("Verification failed: {0}")]
    VerificationFailure(String),

    #[error("Collection failed; missing: {missing:?}")]
    CollectionFailure { missing: Vec<String> },

    #[error("Pipeline already running (lock held at {0:?})")]
    Locked(PathBuf),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, PatcherError>;
