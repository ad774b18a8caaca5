// src/pipeline/classify.rs

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::pipeline::records::{load_weapon_records, strip_bom};
use crate::pipeline::PipelineStep;

pub const DEFAULT_AMMO_CATEGORY: &str = "Standard";

/// Makes sure every extracted ammo type has a category in the strategy file.
///
/// Existing classifications are never touched. The file is rewritten only
/// when something was added, so re-running is a no-op.
#[derive(Debug, Clone)]
pub struct ClassificationStep {
    fs: Arc<dyn FileSystem>,
    weapon_data: PathBuf,
    strategy_file: PathBuf,
    default_category: String,
}

impl ClassificationStep {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        weapon_data: PathBuf,
        strategy_file: PathBuf,
        default_category: impl Into<String>,
    ) -> Self {
        Self {
            fs,
            weapon_data,
            strategy_file,
            default_category: default_category.into(),
        }
    }

    fn classify(&self) -> Result<bool> {
        if !self.fs.is_file(&self.weapon_data) {
            warn!(path = %self.weapon_data.display(), "weapon data missing; cannot classify ammo");
            return Ok(false);
        }
        let weapons = load_weapon_records(self.fs.as_ref(), &self.weapon_data)?;

        let existed = self.fs.is_file(&self.strategy_file);
        let mut strategy = if existed {
            let text = self.fs.read_text_lossy(&self.strategy_file)?;
            serde_json::from_str::<Value>(strip_bom(&text))
                .with_context(|| format!("parsing {:?}", self.strategy_file))?
        } else {
            Value::Object(Map::new())
        };

        let Some(root) = strategy.as_object_mut() else {
            warn!(path = %self.strategy_file.display(), "strategy file is not a JSON object");
            return Ok(false);
        };
        let classification = root
            .entry("ammo_classification")
            .or_insert_with(|| Value::Object(Map::new()));
        let Some(classification) = classification.as_object_mut() else {
            warn!("strategy.ammo_classification is not an object");
            return Ok(false);
        };

        let mut added = 0usize;
        for weapon in &weapons {
            let id = weapon.ammo_form_id.trim().to_lowercase();
            if id.is_empty() || classification.contains_key(&id) {
                continue;
            }
            classification.insert(id, Value::String(self.default_category.clone()));
            added += 1;
        }

        if added == 0 && existed {
            info!(weapons = weapons.len(), "ammo classification already complete");
            return Ok(true);
        }

        let mut rendered = serde_json::to_string_pretty(&strategy)?;
        rendered.push('\n');
        self.fs.write(&self.strategy_file, rendered.as_bytes())?;
        info!(
            added,
            category = %self.default_category,
            path = %self.strategy_file.display(),
            "ammo classification updated"
        );
        Ok(true)
    }
}

impl PipelineStep for ClassificationStep {
    fn name(&self) -> &str {
        "classify-ammo"
    }

    fn run(&mut self) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + '_>> {
        Box::pin(async move { self.classify() })
    }
}
