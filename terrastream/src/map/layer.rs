//! Data source traits.

use thiserror::Error;

use crate::io::IoOptions;
use crate::key::TileKey;
use crate::model::{Heightfield, Image};

/// Errors a layer can report for a single fetch.
///
/// These never escape the tile factory: a failed fetch is logged and the
/// tile keeps whatever it inherited from its parent.
#[derive(Debug, Error)]
pub enum LayerError {
    /// The source could not produce data for this key right now.
    #[error("layer '{layer}' failed to produce {key}: {reason}")]
    Failed {
        layer: String,
        key: TileKey,
        reason: String,
    },

    /// The layer was never opened or has been closed.
    #[error("layer '{layer}' is not open")]
    NotOpen { layer: String },

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Behavior shared by all tiled layers.
pub trait TileLayer: Send + Sync {
    /// Returns the layer's name for logging and identification.
    fn name(&self) -> &str;

    /// Returns the coarsest level with data.
    fn min_level(&self) -> u32 {
        0
    }

    /// Returns the finest level with data. Deeper tiles reuse data from the
    /// ancestor at this level.
    fn max_level(&self) -> u32;

    /// Checks if this layer has data at the given level.
    fn supports_level(&self, level: u32) -> bool {
        level >= self.min_level() && level <= self.max_level()
    }
}

/// Source of color imagery.
pub trait ImageLayer: TileLayer {
    /// Produces the image for `key`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the source simply has no data for this key (the
    /// caller may try an ancestor), or an error for a failed fetch.
    fn create_image(&self, key: &TileKey, io: &IoOptions) -> Result<Option<Image>, LayerError>;
}

/// Source of elevation grids.
pub trait ElevationLayer: TileLayer {
    /// Produces the heightfield for `key`, with the same `Ok(None)`
    /// convention as [`ImageLayer::create_image`].
    fn create_heightfield(
        &self,
        key: &TileKey,
        io: &IoOptions,
    ) -> Result<Option<Heightfield>, LayerError>;
}
