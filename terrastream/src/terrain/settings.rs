//! Terrain engine settings.

use serde::{Deserialize, Serialize};

use super::error::TerrainError;
use crate::geometry::GeometrySettings;
use crate::key::MAX_LEVEL;

/// Default vertices per tile edge.
pub const DEFAULT_TILE_SIZE: u32 = 17;

/// Default skirt depth relative to tile size.
pub const DEFAULT_SKIRT_RATIO: f32 = 0.025;

/// Default deepest level of detail.
pub const DEFAULT_MAX_LEVEL_OF_DETAIL: u32 = 19;

/// Default visibility range as a multiple of tile radius.
pub const DEFAULT_LOD_TRANSITION_FACTOR: f32 = 7.0;

/// Default fraction of a level's range spent morphing.
pub const DEFAULT_MORPH_RATIO: f32 = 0.2;

/// Tunables for one terrain engine.
///
/// Every field has a default, so partial JSON documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Vertices per tile edge.
    pub tile_size: u32,
    /// Skirt depth relative to tile size.
    pub skirt_ratio: f32,
    /// Emit morph targets so levels blend smoothly.
    pub morph_terrain: bool,
    /// Level root tiles are created at.
    pub min_level_of_detail: u32,
    /// Deepest level tiles subdivide to.
    pub max_level_of_detail: u32,
    pub lod_transition_factor: f32,
    pub morph_ratio: f32,
    /// Load elevation and imagery through separate requests.
    pub load_elevation_separately: bool,
    pub generate_normal_maps: bool,
    /// Cap on tiles evicted per update; `None` for no cap.
    pub max_dispose_per_frame: Option<usize>,
    /// Share meshes between tiles with the same configuration.
    pub enable_geometry_pool: bool,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            skirt_ratio: DEFAULT_SKIRT_RATIO,
            morph_terrain: true,
            min_level_of_detail: 0,
            max_level_of_detail: DEFAULT_MAX_LEVEL_OF_DETAIL,
            lod_transition_factor: DEFAULT_LOD_TRANSITION_FACTOR,
            morph_ratio: DEFAULT_MORPH_RATIO,
            load_elevation_separately: false,
            generate_normal_maps: true,
            max_dispose_per_frame: None,
            enable_geometry_pool: true,
        }
    }
}

impl TerrainSettings {
    /// Checks every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidSettings`] naming the first bad field.
    pub fn validate(&self) -> Result<(), TerrainError> {
        if self.tile_size < 2 {
            return Err(TerrainError::invalid("tile_size", "must be at least 2"));
        }
        if !(0.0..1.0).contains(&self.skirt_ratio) {
            return Err(TerrainError::invalid(
                "skirt_ratio",
                format!("{} is outside [0, 1)", self.skirt_ratio),
            ));
        }
        if self.max_level_of_detail > MAX_LEVEL {
            return Err(TerrainError::invalid(
                "max_level_of_detail",
                format!("{} exceeds {}", self.max_level_of_detail, MAX_LEVEL),
            ));
        }
        if self.min_level_of_detail > self.max_level_of_detail {
            return Err(TerrainError::invalid(
                "min_level_of_detail",
                format!(
                    "{} is deeper than max_level_of_detail {}",
                    self.min_level_of_detail, self.max_level_of_detail
                ),
            ));
        }
        if !(self.lod_transition_factor > 0.0) {
            return Err(TerrainError::invalid(
                "lod_transition_factor",
                "must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.morph_ratio) {
            return Err(TerrainError::invalid(
                "morph_ratio",
                format!("{} is outside [0, 1]", self.morph_ratio),
            ));
        }
        if self.max_dispose_per_frame == Some(0) {
            return Err(TerrainError::invalid(
                "max_dispose_per_frame",
                "must be at least 1 when set",
            ));
        }
        Ok(())
    }

    pub fn geometry_settings(&self) -> GeometrySettings {
        GeometrySettings {
            tile_size: self.tile_size,
            skirt_ratio: self.skirt_ratio,
            morph_terrain: self.morph_terrain,
        }
    }

    /// Eviction cap handed to the tracker.
    pub fn max_dispose(&self) -> usize {
        self.max_dispose_per_frame.unwrap_or(usize::MAX)
    }

    /// Parses settings from JSON; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, TerrainError> {
        serde_json::from_str(json).map_err(|e| TerrainError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, TerrainError> {
        serde_json::to_string_pretty(self).map_err(|e| TerrainError::Parse(e.to_string()))
    }
}
