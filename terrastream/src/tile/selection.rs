//! Per-level visibility ranges.

use crate::key::{Profile, TileKey};

/// Visibility and morphing distances for one level of detail.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodRange {
    /// Camera distance below which tiles of this level are shown.
    pub visibility_range: f32,
    /// Distance at which geometry starts morphing toward the coarser level.
    pub morph_start: f32,
    /// Distance at which morphing completes.
    pub morph_end: f32,
}

impl LodRange {
    /// Constants the vertex stage uses to blend toward morph targets:
    /// `(end / (end - start), 1 / (end - start))`.
    pub fn morph_constants(&self) -> glam::Vec2 {
        let span = (self.morph_end - self.morph_start).max(f32::EPSILON);
        glam::Vec2::new(self.morph_end / span, 1.0 / span)
    }
}

/// Visibility ranges for every level up to the maximum.
///
/// A level's range is its tile bounding radius times the LOD transition
/// factor, so each finer level becomes visible at half the distance of the
/// level above it.
#[derive(Debug, Clone)]
pub struct SelectionInfo {
    ranges: Vec<LodRange>,
    first_level: u32,
}

impl SelectionInfo {
    /// # Arguments
    ///
    /// * `profile` - Tiling scheme, for tile sizes
    /// * `min_level` - First level tiles are created at
    /// * `max_level` - Deepest level tiles are created at
    /// * `transition_factor` - Range as a multiple of tile radius
    /// * `morph_ratio` - Fraction of the range used for morphing
    pub fn new(
        profile: Profile,
        min_level: u32,
        max_level: u32,
        transition_factor: f32,
        morph_ratio: f32,
    ) -> Self {
        let ranges = (0..=max_level)
            .map(|level| {
                let extent = profile.tile_extent(level, 0, 0);
                let radius = 0.5 * (extent.width().powi(2) + extent.height().powi(2)).sqrt();
                let range = radius as f32 * transition_factor;
                LodRange {
                    visibility_range: range,
                    morph_start: range * (1.0 - morph_ratio.clamp(0.0, 1.0)),
                    morph_end: range,
                }
            })
            .collect();
        Self {
            ranges,
            first_level: min_level,
        }
    }

    /// Range for the key's level, or `None` beyond the maximum level.
    pub fn get(&self, key: &TileKey) -> Option<LodRange> {
        self.ranges.get(key.level_of_detail() as usize).copied()
    }

    /// Number of levels, counting from level 0.
    pub fn num_lods(&self) -> u32 {
        self.ranges.len() as u32
    }

    pub fn first_level(&self) -> u32 {
        self.first_level
    }

    /// Deepest level tiles are created at.
    pub fn max_level(&self) -> u32 {
        self.num_lods().saturating_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_halve_per_level() {
        let info = SelectionInfo::new(Profile::SphericalMercator, 0, 4, 6.0, 0.2);
        let key = |level| TileKey::new(level, 0, 0, Profile::SphericalMercator);
        let r0 = info.get(&key(0)).unwrap().visibility_range;
        let r1 = info.get(&key(1)).unwrap().visibility_range;
        assert!((r0 / r1 - 2.0).abs() < 1e-4);
        assert_eq!(info.num_lods(), 5);
        assert_eq!(info.max_level(), 4);
        assert!(info.get(&key(5)).is_none());
    }

    #[test]
    fn test_morph_window() {
        let info = SelectionInfo::new(Profile::GlobalGeodetic, 0, 2, 4.0, 0.25);
        let range = info.get(&TileKey::new(1, 0, 0, Profile::GlobalGeodetic)).unwrap();
        assert_eq!(range.morph_end, range.visibility_range);
        assert!((range.morph_start - range.visibility_range * 0.75).abs() < 1e-3);
        let c = range.morph_constants();
        assert!((c.x - range.morph_end * c.y).abs() < 1e-3);
    }
}
