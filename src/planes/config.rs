//! Plane finding configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};
use crate::scene::LayerId;

use super::classifier::ClassifierSettings;
use super::types::{SemanticMask, SemanticType};

/// Optional material name per semantic type, handed to the renderer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneMaterials {
    pub wall: Option<String>,
    pub floor: Option<String>,
    pub ceiling: Option<String>,
    pub platform: Option<String>,
    pub unknown: Option<String>,
}

impl PlaneMaterials {
    /// Material for a semantic type, if one is configured.
    pub fn get(&self, semantic: SemanticType) -> Option<&str> {
        let slot = match semantic {
            SemanticType::Wall => &self.wall,
            SemanticType::Floor => &self.floor,
            SemanticType::Ceiling => &self.ceiling,
            SemanticType::Platform => &self.platform,
            SemanticType::Unknown => &self.unknown,
        };
        slot.as_deref()
    }
}

/// Configuration for extraction, classification and the plane registry.
///
/// Missing fields in a JSON file fall back to the defaults below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneConfig {
    /// Minimum plane area in square meters
    pub min_area: f32,
    /// Planes within this many degrees of horizontal are snapped flat
    pub snap_to_gravity_threshold_degrees: f32,
    /// Minimum `|normal.y|` of a horizontal plane, in (0.5, 1.0]
    pub up_normal_threshold: f32,
    /// Height above the floor still classified as floor (m)
    pub floor_buffer: f32,
    /// Depth below the ceiling still classified as ceiling (m)
    pub ceiling_buffer: f32,
    /// Types whose visuals are shown
    pub draw_mask: SemanticMask,
    /// Types that are classified but never registered
    pub discard_mask: SemanticMask,
    /// Layer plane visuals are tagged with
    pub layer: LayerId,
    pub materials: PlaneMaterials,
}

impl Default for PlaneConfig {
    fn default() -> Self {
        Self {
            min_area: 0.025,
            snap_to_gravity_threshold_degrees: 5.0,
            up_normal_threshold: 0.9,
            floor_buffer: 0.1,
            ceiling_buffer: 0.1,
            draw_mask: SemanticType::Wall
                | SemanticType::Floor
                | SemanticType::Ceiling
                | SemanticType::Platform,
            discard_mask: SemanticMask::UNKNOWN,
            layer: LayerId::SPATIAL_MAPPING,
            materials: PlaneMaterials::default(),
        }
    }
}

impl PlaneConfig {
    /// Check option ranges. Run once when a configuration is adopted.
    pub fn validate(&self) -> Result<()> {
        if !(self.up_normal_threshold > 0.5 && self.up_normal_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "up_normal_threshold must be in (0.5, 1.0], got {}",
                self.up_normal_threshold
            )));
        }
        if !(self.floor_buffer >= 0.0) {
            return Err(Error::Config(format!(
                "floor_buffer must be >= 0, got {}",
                self.floor_buffer
            )));
        }
        if !(self.ceiling_buffer >= 0.0) {
            return Err(Error::Config(format!(
                "ceiling_buffer must be >= 0, got {}",
                self.ceiling_buffer
            )));
        }
        if !(self.min_area > 0.0 && self.min_area.is_finite()) {
            return Err(Error::Config(format!(
                "min_area must be a positive finite number, got {}",
                self.min_area
            )));
        }
        if !(0.0..=90.0).contains(&self.snap_to_gravity_threshold_degrees) {
            return Err(Error::Config(format!(
                "snap_to_gravity_threshold_degrees must be in [0, 90], got {}",
                self.snap_to_gravity_threshold_degrees
            )));
        }
        Ok(())
    }

    /// The subset of options the classifier needs.
    pub fn classifier_settings(&self) -> ClassifierSettings {
        ClassifierSettings {
            up_normal_threshold: self.up_normal_threshold,
            floor_buffer: self.floor_buffer,
            ceiling_buffer: self.ceiling_buffer,
        }
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded plane config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
