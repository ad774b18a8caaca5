// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::RawConfigFile;
use crate::config::provider::ConfigProvider;
use crate::config::validate::validate_config;
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (required paths, job/script consistency). Use
/// [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and run basic validation.
///
/// This is the recommended entry point for the rest of the application:
///
/// - Reads TOML.
/// - Anchors relative paths at `[Paths].project_root`.
/// - Checks for:
///   - missing structural paths,
///   - jobs referring to unknown `[Scripts]` keys,
///   - broken fallback globs / patterns,
///   - an intermediary launcher enabled without an executable.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigProvider> {
    let raw_config = load_from_path(&path)?;
    let provider = ConfigProvider::from_raw(path.as_ref(), raw_config);
    validate_config(&provider)?;
    Ok(provider)
}
