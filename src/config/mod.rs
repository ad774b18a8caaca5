// src/config/mod.rs

//! Configuration loading and typed access for autopatcher.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Resolve paths, strings, booleans and numbers with defaults (`provider.rs`).
//! - Validate structural requirements (`validate.rs`).

pub mod loader;
pub mod model;
pub mod provider;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    default_jobs, strategy_job, EnvironmentSettings, FallbackRuleConfig, JobSpec, RawConfigFile,
    RunSettings,
};
pub use provider::ConfigProvider;
pub use validate::validate_config;
