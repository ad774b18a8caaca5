// src/pipeline/generate.rs

//! Patcher INI generation.
//!
//! Output is a pure function of its inputs (no timestamp, factions in sorted
//! order), and the file is only rewritten when its blake3 digest changes, so
//! downstream tools watching the file do not see spurious updates.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::pipeline::records::{
    load_strategy, load_weapon_records, parse_ammo_map, Strategy, WeaponRecord,
};
use crate::pipeline::PipelineStep;

pub const DEFAULT_OUTPUT_FILENAME: &str = "weapons.ini";

/// Render the INI text for a set of weapons.
pub fn render_patch_ini(
    strategy: &Strategy,
    weapons: &[WeaponRecord],
    ammo_map: &BTreeMap<String, String>,
) -> String {
    let mut out = String::new();
    out.push_str("; Generated by autopatcher\n\n");
    out.push_str("[Settings]\n;\n\n[Leveled List Integration]\n;\n");

    for weapon in weapons {
        let original = weapon.ammo_form_id.trim().to_lowercase();
        let ammo = ammo_map.get(&original).unwrap_or(&original);

        let Some(category) = strategy.ammo_classification.get(ammo) else {
            warn!(weapon = %weapon.editor_id, ammo = %ammo, "no ammo category; weapon skipped");
            continue;
        };

        let entries: Vec<String> = strategy
            .faction_leveled_lists
            .iter()
            .filter_map(|(faction, list)| {
                let chance = strategy
                    .allocation_matrix
                    .get(faction)
                    .and_then(|row| row.get(category))
                    .copied()?;
                (chance > 0.0).then(|| format!("{list}@{category}:{chance}"))
            })
            .collect();

        if entries.is_empty() {
            debug!(weapon = %weapon.editor_id, category = %category, "no faction spawns this category");
            continue;
        }

        out.push_str(&format!("\n[Weapon.{}]\n", weapon.editor_id.replace(' ', "_")));
        out.push_str(&format!("name = {}\n", weapon.full_name));
        out.push_str(&format!("leveled_lists = {}\n", entries.join(", ")));
    }
    out
}

#[derive(Debug, Clone)]
pub struct GenerationStep {
    fs: Arc<dyn FileSystem>,
    strategy_file: PathBuf,
    weapon_data: PathBuf,
    ammo_map_file: Option<PathBuf>,
    output_file: PathBuf,
}

impl GenerationStep {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        strategy_file: PathBuf,
        weapon_data: PathBuf,
        ammo_map_file: Option<PathBuf>,
        output_file: PathBuf,
    ) -> Self {
        Self {
            fs,
            strategy_file,
            weapon_data,
            ammo_map_file,
            output_file,
        }
    }

    pub fn output_file(&self) -> &PathBuf {
        &self.output_file
    }

    fn generate(&self) -> Result<bool> {
        for required in [&self.strategy_file, &self.weapon_data] {
            if !self.fs.is_file(required) {
                warn!(path = %required.display(), "file required for generation is missing");
                return Ok(false);
            }
        }

        let strategy = load_strategy(self.fs.as_ref(), &self.strategy_file)?;
        let weapons = load_weapon_records(self.fs.as_ref(), &self.weapon_data)?;
        let ammo_map = match &self.ammo_map_file {
            Some(path) if self.fs.is_file(path) => parse_ammo_map(&self.fs.read_text_lossy(path)?),
            _ => BTreeMap::new(),
        };
        debug!(
            weapons = weapons.len(),
            remapped = ammo_map.len(),
            "generating patcher ini"
        );

        let rendered = render_patch_ini(&strategy, &weapons, &ammo_map);
        self.write_if_changed(rendered.as_bytes())?;
        Ok(true)
    }

    fn write_if_changed(&self, contents: &[u8]) -> Result<()> {
        if self.fs.is_file(&self.output_file) {
            let existing = self.fs.read_text_lossy(&self.output_file)?;
            if blake3::hash(existing.as_bytes()) == blake3::hash(contents) {
                info!(path = %self.output_file.display(), "patcher ini unchanged");
                return Ok(());
            }
        }
        self.fs.write(&self.output_file, contents)?;
        info!(path = %self.output_file.display(), "patcher ini written");
        Ok(())
    }
}

impl PipelineStep for GenerationStep {
    fn name(&self) -> &str {
        "generate-ini"
    }

    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move { self.generate() })
    }
}
