use std::path::Path;

use anyhow::Context;
use bevy::prelude::*;
use serde::Deserialize;

use crate::pipeline::{FrameJobConfig, DEFAULT_BATCH_SIZE};

/// Initial shader toggles for newly created controllers.
#[derive(Reflect, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ControllerDefaults {
    pub use_passthrough_mean_bone_position: bool,
    pub normal_hull: bool,
    pub normal_hull_scale: f32,
}

impl Default for ControllerDefaults {
    fn default() -> Self {
        Self {
            use_passthrough_mean_bone_position: false,
            normal_hull: false,
            normal_hull_scale: 0.0,
        }
    }
}

/// Resource holding global spheroid normal settings
#[derive(Resource, Reflect, Deserialize, Debug, Clone, PartialEq)]
#[reflect(Resource, Default)]
#[serde(default)]
pub struct SpheroidNormalSettings {
    /// Bones or vertices handled by one job batch
    pub batch_size: usize,
    /// Global switch for the mean bone position stage; controllers can only narrow it
    pub mean_bone_positions: bool,
    pub defaults: ControllerDefaults,
}

impl Default for SpheroidNormalSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            mean_bone_positions: true,
            defaults: ControllerDefaults::default(),
        }
    }
}

impl SpheroidNormalSettings {
    pub fn frame_job_config(&self, controller_mean_bone_positions: bool) -> FrameJobConfig {
        FrameJobConfig {
            batch_size: self.batch_size.max(1),
            mean_bone_positions: self.mean_bone_positions && controller_mean_bone_positions,
        }
    }
}

pub fn read_settings(path: &Path) -> anyhow::Result<SpheroidNormalSettings> {
    let toml_str = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.to_string_lossy()))?;
    let settings = toml::from_str(&toml_str)
        .with_context(|| format!("parsing {}", path.to_string_lossy()))?;
    Ok(settings)
}

/// Loads settings from a TOML file, falling back to defaults when the file is
/// missing or invalid.
pub fn load_settings(path: &Path) -> SpheroidNormalSettings {
    match read_settings(path) {
        Ok(settings) => {
            log::info!(
                "[SPHEROID NORMAL] Read settings from {}",
                path.to_string_lossy()
            );
            settings
        }
        Err(error) => {
            log::warn!(
                "[SPHEROID NORMAL] Failed to load settings, using defaults: {:#}",
                error
            );
            SpheroidNormalSettings::default()
        }
    }
}
