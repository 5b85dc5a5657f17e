//! Tile data produced by loads and installed by merges.
//!
//! A [`TerrainTileModel`] is the transient result of one data load. Merging
//! copies pieces of it into the tile's long-lived [`RenderModel`], where each
//! texture carries a scale/bias matrix mapping the tile's own texture
//! coordinates into the (possibly coarser) source image.

mod heightfield;
mod matrix;
mod normals;

pub use heightfield::Heightfield;
pub use matrix::{quadrant_scale_bias, scale_bias, transform_uv};
pub use normals::create_normal_map;

use std::sync::Arc;

use glam::Mat4;

use crate::key::TileKey;
use crate::map::LayerId;

/// 8-bit RGBA raster used for imagery and normal maps.
pub type Image = image::RgbaImage;

/// One color layer's contribution to a tile.
#[derive(Debug, Clone)]
pub struct ColorLayerModel {
    pub layer: LayerId,
    pub image: Arc<Image>,
    pub matrix: Mat4,
    /// Key the image was actually fetched for (may be an ancestor).
    pub source: TileKey,
}

#[derive(Debug, Clone)]
pub struct ElevationModel {
    pub layer: LayerId,
    pub heightfield: Arc<Heightfield>,
    pub matrix: Mat4,
    pub source: TileKey,
}

#[derive(Debug, Clone)]
pub struct NormalMapModel {
    pub image: Arc<Image>,
    pub matrix: Mat4,
    pub source: TileKey,
}

/// Result of one tile data load.
#[derive(Debug, Clone, Default)]
pub struct TerrainTileModel {
    pub color_layers: Vec<ColorLayerModel>,
    pub elevation: Option<ElevationModel>,
    pub normal_map: Option<NormalMapModel>,
}

impl TerrainTileModel {
    /// True when the load produced nothing to merge.
    pub fn is_empty(&self) -> bool {
        self.color_layers.is_empty() && self.elevation.is_none() && self.normal_map.is_none()
    }
}

/// A texture bound to a tile, with the matrix into its source image.
#[derive(Debug)]
pub struct TextureSlot<T> {
    pub data: Arc<T>,
    pub matrix: Mat4,
    pub source: TileKey,
}

impl<T> Clone for TextureSlot<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            matrix: self.matrix,
            source: self.source,
        }
    }
}

impl<T> TextureSlot<T> {
    pub fn new(data: Arc<T>, matrix: Mat4, source: TileKey) -> Self {
        Self {
            data,
            matrix,
            source,
        }
    }

    /// Same texture, viewed from one child quadrant.
    fn for_quadrant(&self, quadrant: u32) -> Self {
        Self {
            data: Arc::clone(&self.data),
            matrix: self.matrix * quadrant_scale_bias(quadrant),
            source: self.source,
        }
    }
}

/// Render-side state of a tile.
#[derive(Debug, Clone, Default)]
pub struct RenderModel {
    pub color: Option<TextureSlot<Image>>,
    pub elevation: Option<TextureSlot<Heightfield>>,
    pub normal: Option<TextureSlot<Image>>,
}

impl RenderModel {
    /// The model a child in `quadrant` starts from: the same textures with
    /// matrices narrowed to that quadrant.
    pub fn inherited(&self, quadrant: u32) -> RenderModel {
        RenderModel {
            color: self.color.as_ref().map(|s| s.for_quadrant(quadrant)),
            elevation: self.elevation.as_ref().map(|s| s.for_quadrant(quadrant)),
            normal: self.normal.as_ref().map(|s| s.for_quadrant(quadrant)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.color.is_none() && self.elevation.is_none() && self.normal.is_none()
    }

    /// Elevation range covered by this tile's view of its heightfield.
    pub fn elevation_range(&self) -> Option<(f32, f32)> {
        let slot = self.elevation.as_ref()?;
        let (u0, v0) = transform_uv(&slot.matrix, 0.0, 0.0);
        let (u1, v1) = transform_uv(&slot.matrix, 1.0, 1.0);
        Some(slot.data.min_max_in(u0, v0, u1, v1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::Profile;

    fn slot<T>(value: T) -> TextureSlot<T> {
        TextureSlot::new(
            Arc::new(value),
            Mat4::IDENTITY,
            TileKey::new(0, 0, 0, Profile::GlobalGeodetic),
        )
    }

    #[test]
    fn test_empty_model() {
        assert!(TerrainTileModel::default().is_empty());
        assert!(RenderModel::default().is_empty());
    }

    #[test]
    fn test_inherited_narrows_matrix_and_shares_data() {
        let parent = RenderModel {
            color: Some(slot(Image::new(4, 4))),
            ..RenderModel::default()
        };
        let child = parent.inherited(3);
        let color = child.color.unwrap();
        assert!(Arc::ptr_eq(&color.data, &parent.color.as_ref().unwrap().data));
        assert_eq!(transform_uv(&color.matrix, 0.0, 0.0), (0.5, 0.5));
        assert_eq!(transform_uv(&color.matrix, 1.0, 1.0), (1.0, 1.0));
        assert!(child.elevation.is_none());
    }

    #[test]
    fn test_elevation_range_follows_matrix() {
        // Left half low, right half high.
        let hf = Heightfield::from_fn(3, 3, |col, _| if col == 0 { 0.0 } else { 100.0 });
        let parent = RenderModel {
            elevation: Some(slot(hf)),
            ..RenderModel::default()
        };
        assert_eq!(parent.elevation_range(), Some((0.0, 100.0)));
        // Quadrant 1 sees only the right half.
        assert_eq!(parent.inherited(1).elevation_range(), Some((100.0, 100.0)));
    }
}
