// src/pipeline/records.rs

//! Data files exchanged between the extraction jobs and the post-processing
//! steps.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::fs::FileSystem;

/// One row of `weapon_ammo_map.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WeaponRecord {
    pub editor_id: String,
    #[serde(default)]
    pub full_name: String,
    pub ammo_form_id: String,
}

/// The parts of the strategy file the generator reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Strategy {
    /// Lower-cased ammo form id → category.
    #[serde(default)]
    pub ammo_classification: BTreeMap<String, String>,
    /// Faction → category → spawn chance.
    #[serde(default)]
    pub allocation_matrix: BTreeMap<String, BTreeMap<String, f64>>,
    /// Faction → leveled list name.
    #[serde(default)]
    pub faction_leveled_lists: BTreeMap<String, String>,
}

pub fn load_weapon_records(fs: &dyn FileSystem, path: &Path) -> Result<Vec<WeaponRecord>> {
    let text = fs.read_text_lossy(path)?;
    serde_json::from_str(strip_bom(&text)).with_context(|| format!("parsing {:?}", path))
}

pub fn load_strategy(fs: &dyn FileSystem, path: &Path) -> Result<Strategy> {
    let text = fs.read_text_lossy(path)?;
    serde_json::from_str(strip_bom(&text)).with_context(|| format!("parsing {:?}", path))
}

/// Parse the `[UnmappedAmmo]` section of the mapper's INI output.
///
/// Keys and values are lower-cased; `;`/`#` comments and other sections are
/// ignored.
pub fn parse_ammo_map(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    let mut in_section = false;

    for line in strip_bom(text).lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim().eq_ignore_ascii_case("UnmappedAmmo");
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((key, value)) = line.split_once('=').or_else(|| line.split_once(':')) else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        if !key.is_empty() && !value.is_empty() {
            map.insert(key.to_lowercase(), value.to_lowercase());
        }
    }
    map
}

pub(crate) fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}
