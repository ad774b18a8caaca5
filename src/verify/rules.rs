// src/verify/rules.rs

//! Fallback log locations.
//!
//! Depending on how the editor was launched its log may land somewhere
//! other than the session log we asked for. Which places are worth looking
//! at is deployment-specific, so the set is configurable through
//! `[[Verification.fallback]]`; [`default_rules`] applies when none are
//! configured.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::config::{ConfigProvider, FallbackRuleConfig};
use crate::errors::{PatcherError, Result};

/// Secondary marker the bundled scripts print on completion.
pub const DEFAULT_GENERIC_PATTERN: &str = r"\[AutoPatcher\].*complete";

/// A directory + file glob to scan, with an optional secondary pattern.
#[derive(Debug, Clone)]
pub struct FallbackLogRule {
    pub dir: PathBuf,
    glob: GlobMatcher,
    pattern: Option<Regex>,
}

impl FallbackLogRule {
    pub fn new(dir: impl Into<PathBuf>, glob: &str, pattern: Option<&str>) -> Result<Self> {
        let matcher = Glob::new(glob)
            .map_err(|e| PatcherError::ConfigError(format!("invalid fallback glob '{glob}': {e}")))?
            .compile_matcher();
        let pattern = pattern
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    PatcherError::ConfigError(format!("invalid fallback pattern '{p}': {e}"))
                })
            })
            .transpose()?;

        Ok(Self {
            dir: dir.into(),
            glob: matcher,
            pattern,
        })
    }

    /// Resolve and compile a configured rule.
    pub fn compile(cfg: &FallbackRuleConfig, provider: &ConfigProvider) -> Result<Self> {
        Self::new(
            provider.resolve_relative(&cfg.dir),
            &cfg.glob,
            cfg.pattern.as_deref(),
        )
    }

    /// Whether a file (by name) belongs to this rule.
    pub fn matches_file(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| self.glob.is_match(Path::new(name)))
            .unwrap_or(false)
    }

    /// Whether `text` carries evidence of success: the job marker itself,
    /// or this rule's secondary pattern.
    pub fn matches_text(&self, text: &str, marker: &str) -> bool {
        if super::contains_marker(text, marker) {
            return true;
        }
        self.pattern
            .as_ref()
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    }
}

/// Rules used when the config declares none.
///
/// - the session log directory (`*.log`, which also holds captured stdout),
/// - the editor directory (`*_log.txt`, the editor's own session log),
/// - the launcher's redirected folder when one is in play (`*.log`).
pub fn default_rules(
    logs_dir: &Path,
    editor_dir: Option<&Path>,
    overwrite_dir: Option<&Path>,
) -> Vec<FallbackLogRule> {
    let mut rules = Vec::new();
    let mut push = |dir: &Path, glob: &str| {
        if let Ok(rule) = FallbackLogRule::new(dir, glob, Some(DEFAULT_GENERIC_PATTERN)) {
            rules.push(rule);
        }
    };

    push(logs_dir, "*.log");
    if let Some(dir) = editor_dir {
        push(dir, "*_log.txt");
    }
    if let Some(dir) = overwrite_dir {
        push(dir, "*.log");
    }
    rules
}

/// Whether a file is recent enough to say anything about this run.
pub fn modified_since(modified: SystemTime, since: SystemTime) -> bool {
    modified >= since
}
