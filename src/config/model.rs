// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use toml::Table;

use crate::types::ShortcutFormat;

/// Top-level configuration as read from the TOML file.
///
/// ```toml
/// [Paths]
/// editor_executable = "C:/Tools/FO4Edit/FO4Edit.exe"
/// scripts_dir = "pas_scripts"
/// game_data_path = "C:/Games/Fallout 4/Data"
/// output_dir = "Output"
///
/// [Environment]
/// use_intermediary = true
/// intermediary_executable = "C:/MO2/ModOrganizer.exe"
/// profile_name = "Default"
/// entry_name = "FO4Edit"
///
/// [Parameters]
/// execution_timeout_secs = 600
///
/// [Scripts]
/// weapon_ammo_extractor = "AutoPatcher_ExtractWeaponAmmo.pas"
/// ```
///
/// The four key/value sections stay untyped here and are read through
/// [`crate::config::ConfigProvider`]; `[[Jobs]]` and `[Verification]` are
/// structured and deserialised directly.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(rename = "Paths", default)]
    pub paths: Table,

    #[serde(rename = "Environment", default)]
    pub environment: Table,

    #[serde(rename = "Parameters", default)]
    pub parameters: Table,

    #[serde(rename = "Scripts", default)]
    pub scripts: Table,

    /// `None` means "use the built-in extraction jobs".
    #[serde(rename = "Jobs", default)]
    pub jobs: Option<Vec<JobSpec>>,

    #[serde(rename = "Verification", default)]
    pub verification: VerificationSection,
}

/// `[Verification]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerificationSection {
    /// Extra log locations scanned when the session log lacks the marker.
    #[serde(default)]
    pub fallback: Vec<FallbackRuleConfig>,
}

/// One scripted unit of work for the external editor.
///
/// Deserialised from a `[[Jobs]]` table:
///
/// ```toml
/// [[Jobs]]
/// script_key = "weapon_ammo_extractor"
/// success_marker = "[AutoPatcher] Weapon and ammo mapping extraction complete."
/// expected_outputs = ["weapon_ammo_map.json", "unique_ammo_for_mapping.ini"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobSpec {
    /// Key into the `[Scripts]` section.
    pub script_key: String,

    /// Literal string the script prints/logs when it finished correctly.
    pub success_marker: String,

    /// Files the script is expected to write, in collection order.
    #[serde(default)]
    pub expected_outputs: Vec<String>,
}

impl JobSpec {
    pub fn new(
        script_key: impl Into<String>,
        success_marker: impl Into<String>,
        expected_outputs: &[&str],
    ) -> Self {
        Self {
            script_key: script_key.into(),
            success_marker: success_marker.into(),
            expected_outputs: expected_outputs.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Extraction jobs used when the config file declares no `[[Jobs]]`.
pub fn default_jobs() -> Vec<JobSpec> {
    vec![
        JobSpec::new(
            "weapon_ammo_extractor",
            "[AutoPatcher] Weapon and ammo mapping extraction complete.",
            &["weapon_ammo_map.json", "unique_ammo_for_mapping.ini"],
        ),
        JobSpec::new(
            "leveled_list_exporter",
            "[AutoPatcher] Leveled list export complete.",
            &["leveled_lists.json"],
        ),
        JobSpec::new(
            "munitions_id_exporter",
            "[AutoPatcher] Munitions ammo ID export complete.",
            &["munitions_ammo_ids.ini"],
        ),
    ]
}

/// The standalone strategy-file job (`autopatcher strategy`).
pub fn strategy_job() -> JobSpec {
    JobSpec::new(
        "strategy_generator",
        "[AutoPatcher] Strategy JSON generation complete.",
        &[],
    )
}

/// `[Environment]` section, resolved.
///
/// Read-only to everything downstream of the config provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvironmentSettings {
    pub use_intermediary: bool,
    pub intermediary_executable: Option<PathBuf>,
    pub profile_name: Option<String>,
    pub entry_name: Option<String>,
    pub shortcut_format: ShortcutFormat,
    pub shortcut_scheme: String,
    pub instance_name: Option<String>,
    /// The launcher's redirected output folder (e.g. an "overwrite" dir).
    pub overwrite_dir: Option<PathBuf>,
}

/// Raw `[[Verification.fallback]]` entry before path resolution and
/// pattern compilation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FallbackRuleConfig {
    pub dir: String,
    #[serde(default = "default_fallback_glob")]
    pub glob: String,
    /// Optional secondary regex; the job's own marker is always searched.
    #[serde(default)]
    pub pattern: Option<String>,
}

fn default_fallback_glob() -> String {
    "*.log".to_string()
}

/// Numeric / behavioural knobs from `[Parameters]`.
///
/// Every field has a default; misconfigured values fall back silently.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub execution_timeout: Duration,
    pub verification_timeout: Duration,
    pub discovery_tolerance: Duration,
    pub poll_interval: Duration,
    pub mapper_timeout: Duration,
    /// When true, a collection failure fails the job even after a
    /// marker-based verification success.
    pub strict_collection: bool,
}

pub const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_VERIFICATION_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_DISCOVERY_TOLERANCE_SECS: f64 = 1.0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAPPER_TIMEOUT_SECS: u64 = 3600;
/// Timeouts above a week are treated as misconfiguration.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 3600;

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            execution_timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
            verification_timeout: Duration::from_secs(DEFAULT_VERIFICATION_TIMEOUT_SECS),
            discovery_tolerance: Duration::from_secs_f64(DEFAULT_DISCOVERY_TOLERANCE_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            mapper_timeout: Duration::from_secs(DEFAULT_MAPPER_TIMEOUT_SECS),
            strict_collection: false,
        }
    }
}
