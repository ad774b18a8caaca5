// src/config/provider.rs

//! Typed accessors over the section-keyed config table.
//!
//! The contract mirrors how the rest of the crate treats configuration:
//!
//! - paths a job structurally needs are hard errors when missing
//!   ([`ConfigProvider::resolve_path`]);
//! - strings, booleans and numbers always have a default and degrade
//!   gracefully (a bad number is logged and replaced by its default).

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use toml::{Table, Value};
use tracing::{debug, warn};

use crate::config::model::{
    default_jobs, EnvironmentSettings, FallbackRuleConfig, JobSpec, RawConfigFile, RunSettings,
    DEFAULT_DISCOVERY_TOLERANCE_SECS, DEFAULT_EXECUTION_TIMEOUT_SECS,
    DEFAULT_MAPPER_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_VERIFICATION_TIMEOUT_SECS,
    MAX_TIMEOUT_SECS,
};
use crate::errors::{PatcherError, Result};
use crate::types::ShortcutFormat;

pub const SECTION_PATHS: &str = "Paths";
pub const SECTION_ENVIRONMENT: &str = "Environment";
pub const SECTION_PARAMETERS: &str = "Parameters";
pub const SECTION_SCRIPTS: &str = "Scripts";

pub const DEFAULT_SHORTCUT_SCHEME: &str = "moshortcut";

/// Resolved configuration source.
///
/// Constructed once at startup and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct ConfigProvider {
    project_root: PathBuf,
    sections: Table,
    jobs: Option<Vec<JobSpec>>,
    fallback: Vec<FallbackRuleConfig>,
}

impl ConfigProvider {
    /// Build a provider from an already-deserialised config file.
    ///
    /// `config_path` is only used to anchor `[Paths].project_root`.
    pub fn from_raw(config_path: impl AsRef<Path>, raw: RawConfigFile) -> Self {
        let config_path = config_path.as_ref().to_path_buf();
        let base = config_root_dir(&config_path);

        let root_str = raw
            .paths
            .get("project_root")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(".");
        let root = PathBuf::from(normalize_separators(root_str));
        let project_root = if root.is_absolute() {
            root
        } else {
            base.join(root)
        };

        debug!(
            config = %config_path.display(),
            project_root = %project_root.display(),
            "config provider initialised"
        );

        let mut sections = Table::new();
        sections.insert(SECTION_PATHS.to_string(), Value::Table(raw.paths));
        sections.insert(SECTION_ENVIRONMENT.to_string(), Value::Table(raw.environment));
        sections.insert(SECTION_PARAMETERS.to_string(), Value::Table(raw.parameters));
        sections.insert(SECTION_SCRIPTS.to_string(), Value::Table(raw.scripts));

        Self {
            project_root,
            sections,
            jobs: raw.jobs,
            fallback: raw.verification.fallback,
        }
    }

    /// Parse TOML text and build a provider (used by the loader and tests).
    pub fn from_toml_str(config_path: impl AsRef<Path>, contents: &str) -> Result<Self> {
        let raw: RawConfigFile = toml::from_str(contents)?;
        Ok(Self::from_raw(config_path, raw))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Whether `[section]` contains `key` at all.
    pub fn has_key(&self, section: &str, key: &str) -> bool {
        self.value(section, key).is_some()
    }

    fn value(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections
            .get(section)
            .and_then(Value::as_table)
            .and_then(|t| t.get(key))
    }

    fn non_empty_str(&self, section: &str, key: &str) -> Option<&str> {
        self.value(section, key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Resolve a relative path against the project root.
    pub fn resolve_relative(&self, raw: &str) -> PathBuf {
        let p = PathBuf::from(normalize_separators(raw.trim()));
        if p.is_absolute() {
            p
        } else {
            self.project_root.join(p)
        }
    }

    /// A path the caller cannot work without.
    pub fn resolve_path(&self, section: &str, key: &str) -> Result<PathBuf> {
        let raw = self.non_empty_str(section, key).ok_or_else(|| {
            PatcherError::ConfigError(format!(
                "[{section}].{key} is missing, empty or not a string"
            ))
        })?;
        Ok(self.resolve_relative(raw))
    }

    pub fn resolve_optional_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.non_empty_str(section, key)
            .map(|raw| self.resolve_relative(raw))
    }

    pub fn resolve_string(&self, section: &str, key: &str, default: &str) -> String {
        match self.value(section, key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Integer(i)) => i.to_string(),
            Some(Value::Float(f)) => f.to_string(),
            Some(Value::Boolean(b)) => b.to_string(),
            Some(other) => {
                warn!(section, key, value = %other, "expected a string; using default");
                default.to_string()
            }
            None => default.to_string(),
        }
    }

    pub fn resolve_optional_string(&self, section: &str, key: &str) -> Option<String> {
        self.non_empty_str(section, key).map(str::to_string)
    }

    pub fn resolve_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.value(section, key) {
            Some(Value::Boolean(b)) => *b,
            Some(Value::Integer(0)) => false,
            Some(Value::Integer(1)) => true,
            Some(Value::String(s)) => match parse_bool_str(s) {
                Some(b) => b,
                None => {
                    warn!(section, key, value = %s, "not a boolean; using default {default}");
                    default
                }
            },
            Some(other) => {
                warn!(section, key, value = %other, "not a boolean; using default {default}");
                default
            }
            None => default,
        }
    }

    /// Read a number of any `FromStr` type.
    ///
    /// Integers, floats and numeric strings are all accepted; anything that
    /// fails to cast yields `default` (logged at warn, never an error).
    pub fn resolve_numeric<T>(&self, section: &str, key: &str, default: T) -> T
    where
        T: FromStr + Display + Copy,
    {
        let raw = match self.value(section, key) {
            None => return default,
            Some(Value::Integer(i)) => i.to_string(),
            Some(Value::Float(f)) => f.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
        };

        match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(
                    section,
                    key,
                    value = %raw,
                    "could not interpret value as a number; using default {default}"
                );
                default
            }
        }
    }

    pub fn resolve_string_list(&self, section: &str, key: &str, default: &[&str]) -> Vec<String> {
        match self.value(section, key) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
            Some(other) => {
                warn!(section, key, value = %other, "expected a list of strings; using default");
                default.iter().map(|s| s.to_string()).collect()
            }
            None => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Script filename for a job key, from `[Scripts]`.
    pub fn script_filename(&self, script_key: &str) -> Result<String> {
        self.resolve_optional_string(SECTION_SCRIPTS, script_key)
            .ok_or_else(|| {
                PatcherError::ConfigError(format!(
                    "[{SECTION_SCRIPTS}].{script_key} is not configured"
                ))
            })
    }

    /// Every `[Scripts]` entry with a non-empty string value.
    pub fn scripts(&self) -> BTreeMap<String, String> {
        self.sections
            .get(SECTION_SCRIPTS)
            .and_then(Value::as_table)
            .map(|t| {
                t.iter()
                    .filter_map(|(k, v)| {
                        v.as_str()
                            .map(str::trim)
                            .filter(|s| !s.is_empty())
                            .map(|s| (k.clone(), s.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn environment_settings(&self) -> Result<EnvironmentSettings> {
        let use_intermediary = self.resolve_bool(SECTION_ENVIRONMENT, "use_intermediary", false);
        let intermediary_executable =
            self.resolve_optional_path(SECTION_ENVIRONMENT, "intermediary_executable");

        if use_intermediary && intermediary_executable.is_none() {
            return Err(PatcherError::ConfigError(format!(
                "[{SECTION_ENVIRONMENT}].use_intermediary is true but intermediary_executable is not set"
            )));
        }

        let raw_format = self.resolve_string(SECTION_ENVIRONMENT, "shortcut_format", "auto");
        let shortcut_format = raw_format.parse::<ShortcutFormat>().unwrap_or_else(|e| {
            warn!("{e}; falling back to auto");
            ShortcutFormat::Auto
        });

        Ok(EnvironmentSettings {
            use_intermediary,
            intermediary_executable,
            profile_name: self.resolve_optional_string(SECTION_ENVIRONMENT, "profile_name"),
            entry_name: self.resolve_optional_string(SECTION_ENVIRONMENT, "entry_name"),
            shortcut_format,
            shortcut_scheme: self.resolve_string(
                SECTION_ENVIRONMENT,
                "shortcut_scheme",
                DEFAULT_SHORTCUT_SCHEME,
            ),
            instance_name: self.resolve_optional_string(SECTION_ENVIRONMENT, "instance_name"),
            overwrite_dir: self.resolve_optional_path(SECTION_ENVIRONMENT, "overwrite_dir"),
        })
    }

    pub fn run_settings(&self) -> RunSettings {
        let p = SECTION_PARAMETERS;
        let tolerance = self
            .resolve_numeric(p, "discovery_tolerance_secs", DEFAULT_DISCOVERY_TOLERANCE_SECS)
            .max(0.0);
        let poll_ms = self
            .resolve_numeric(p, "poll_interval_ms", DEFAULT_POLL_INTERVAL_MS)
            .max(10);

        RunSettings {
            execution_timeout: self
                .resolve_timeout(p, "execution_timeout_secs", DEFAULT_EXECUTION_TIMEOUT_SECS),
            verification_timeout: self
                .resolve_timeout(p, "verification_timeout_secs", DEFAULT_VERIFICATION_TIMEOUT_SECS),
            discovery_tolerance: Duration::try_from_secs_f64(tolerance)
                .unwrap_or_else(|_| Duration::from_secs_f64(DEFAULT_DISCOVERY_TOLERANCE_SECS)),
            poll_interval: Duration::from_millis(poll_ms),
            mapper_timeout: self.resolve_timeout(p, "mapper_timeout_secs", DEFAULT_MAPPER_TIMEOUT_SECS),
            strict_collection: self.resolve_bool(p, "strict_collection", false),
        }
    }

    /// A timeout in whole seconds, capped at [`MAX_TIMEOUT_SECS`]. Larger
    /// values fall back to `default_secs`.
    pub fn resolve_timeout(&self, section: &str, key: &str, default_secs: u64) -> Duration {
        let secs = self.resolve_numeric(section, key, default_secs);
        if secs > MAX_TIMEOUT_SECS {
            warn!(
                section,
                key,
                value = secs,
                max = MAX_TIMEOUT_SECS,
                "timeout out of range; using default {default_secs}"
            );
            return Duration::from_secs(default_secs);
        }
        Duration::from_secs(secs)
    }

    /// Jobs from `[[Jobs]]`, or the built-in extraction jobs when absent.
    pub fn jobs(&self) -> Vec<JobSpec> {
        self.jobs.clone().unwrap_or_else(default_jobs)
    }

    /// Raw `[[Verification.fallback]]` entries (possibly empty).
    pub fn fallback_rule_configs(&self) -> &[FallbackRuleConfig] {
        &self.fallback
    }
}

/// Directory the config file lives in; bare filenames anchor to the
/// current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

/// Accept both `/` and `\` in configured paths.
pub fn normalize_separators(raw: &str) -> String {
    if cfg!(windows) {
        raw.replace('/', "\\")
    } else {
        raw.replace('\\', "/")
    }
}

fn parse_bool_str(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}
