// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::provider::{ConfigProvider, SECTION_PATHS, SECTION_SCRIPTS};
use crate::errors::{PatcherError, Result};
use crate::verify::rules::FallbackLogRule;

/// Paths every job needs before anything is launched.
pub const REQUIRED_PATHS: &[&str] = &[
    "editor_executable",
    "scripts_dir",
    "game_data_path",
    "output_dir",
];

/// Validate a loaded provider.
///
/// Only structural problems are reported here; numeric and string knobs are
/// never validated because they fall back to defaults at read time.
pub fn validate_config(cfg: &ConfigProvider) -> Result<()> {
    validate_required_paths(cfg)?;
    cfg.environment_settings()?;
    validate_jobs(cfg)?;
    validate_fallback_rules(cfg)?;
    Ok(())
}

fn validate_required_paths(cfg: &ConfigProvider) -> Result<()> {
    for key in REQUIRED_PATHS {
        cfg.resolve_path(SECTION_PATHS, key)?;
    }
    Ok(())
}

fn validate_jobs(cfg: &ConfigProvider) -> Result<()> {
    let jobs = cfg.jobs();
    if jobs.is_empty() {
        return Err(PatcherError::ConfigError(
            "config must contain at least one [[Jobs]] entry (or omit the section for the defaults)"
                .to_string(),
        ));
    }

    let mut seen = BTreeSet::new();
    for job in jobs.iter() {
        if job.success_marker.trim().is_empty() {
            return Err(PatcherError::ConfigError(format!(
                "job '{}' has an empty success_marker",
                job.script_key
            )));
        }
        if !seen.insert(job.script_key.as_str()) {
            return Err(PatcherError::ConfigError(format!(
                "job '{}' is listed more than once in [[Jobs]]",
                job.script_key
            )));
        }
        if !cfg.has_key(SECTION_SCRIPTS, &job.script_key) {
            return Err(PatcherError::ConfigError(format!(
                "job '{}' has no script filename in [{}]",
                job.script_key, SECTION_SCRIPTS
            )));
        }
    }
    Ok(())
}

fn validate_fallback_rules(cfg: &ConfigProvider) -> Result<()> {
    for rule in cfg.fallback_rule_configs() {
        FallbackLogRule::compile(rule, cfg)?;
    }
    Ok(())
}
