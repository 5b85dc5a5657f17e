//! Assembly of per-tile data models from map layers.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{trace, warn};

use super::layer::{LayerError, TileLayer};
use super::{LayerId, Map};
use crate::io::IoOptions;
use crate::key::TileKey;
use crate::model::{
    create_normal_map, scale_bias, ColorLayerModel, ElevationModel, NormalMapModel,
    TerrainTileModel,
};

/// Selects which layers a load should fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTileManifest {
    include_images: bool,
    include_elevation: bool,
    /// When non-empty, only these layers are fetched.
    layers: BTreeSet<LayerId>,
}

impl Default for CreateTileManifest {
    fn default() -> Self {
        Self::all()
    }
}

impl CreateTileManifest {
    /// Every layer of every kind.
    pub fn all() -> Self {
        Self {
            include_images: true,
            include_elevation: true,
            layers: BTreeSet::new(),
        }
    }

    /// Image layers only.
    pub fn images_only() -> Self {
        Self {
            include_elevation: false,
            ..Self::all()
        }
    }

    /// Elevation layers only.
    pub fn elevation_only() -> Self {
        Self {
            include_images: false,
            ..Self::all()
        }
    }

    /// Restricts the manifest to explicitly listed layers.
    pub fn with_layer(mut self, id: LayerId) -> Self {
        self.layers.insert(id);
        self
    }

    fn lists(&self, id: LayerId) -> bool {
        self.layers.is_empty() || self.layers.contains(&id)
    }

    pub fn includes_image(&self, id: LayerId) -> bool {
        self.include_images && self.lists(id)
    }

    pub fn includes_elevation(&self, id: LayerId) -> bool {
        self.include_elevation && self.lists(id)
    }
}

/// Produces tile data models.
///
/// Implementations are called on scheduler worker threads and may block.
/// They never fail: errors and cancellation yield an empty or partial model.
pub trait TileDataFactory: Send + Sync {
    fn create_tile_model(
        &self,
        map: &Map,
        key: &TileKey,
        manifest: &CreateTileManifest,
        io: &IoOptions,
    ) -> TerrainTileModel;
}

/// Default factory: one image per color layer, the first elevation layer
/// with data, and an optional normal map derived from it.
///
/// A layer with no data at the requested key is asked for the parent key, and
/// so on up the tree; the model then carries a scale/bias matrix into the
/// ancestor's image.
#[derive(Debug, Clone)]
pub struct TerrainTileModelFactory {
    generate_normal_maps: bool,
}

impl Default for TerrainTileModelFactory {
    fn default() -> Self {
        Self {
            generate_normal_maps: true,
        }
    }
}

impl TerrainTileModelFactory {
    pub fn new(generate_normal_maps: bool) -> Self {
        Self {
            generate_normal_maps,
        }
    }

    /// Fetches data for `key` from `layer`, falling back to ancestors.
    ///
    /// Returns the data and the key it was produced for. A fetch error ends
    /// the search; the tile keeps what it inherited.
    fn fetch_with_fallback<L, T, F>(
        layer: &L,
        key: &TileKey,
        io: &IoOptions,
        fetch: F,
    ) -> Option<(T, TileKey)>
    where
        L: TileLayer + ?Sized,
        F: Fn(&TileKey) -> Result<Option<T>, LayerError>,
    {
        let start_level = key.level_of_detail().min(layer.max_level());
        let mut current = key.create_ancestor_key(start_level);

        while let Some(candidate) = current {
            if io.is_cancelled() || candidate.level_of_detail() < layer.min_level() {
                return None;
            }
            match fetch(&candidate) {
                Ok(Some(data)) => return Some((data, candidate)),
                Ok(None) => current = candidate.create_parent_key(),
                Err(e) => {
                    warn!(
                        layer = layer.name(),
                        key = %key,
                        error = %e,
                        "Layer fetch failed"
                    );
                    return None;
                }
            }
        }
        None
    }
}

impl TileDataFactory for TerrainTileModelFactory {
    fn create_tile_model(
        &self,
        map: &Map,
        key: &TileKey,
        manifest: &CreateTileManifest,
        io: &IoOptions,
    ) -> TerrainTileModel {
        let mut model = TerrainTileModel::default();

        for (id, layer) in map.image_layers() {
            if !manifest.includes_image(id) {
                continue;
            }
            let fetched = Self::fetch_with_fallback(layer.as_ref(), key, io, |k| {
                layer.create_image(k, io)
            });
            if let Some((image, source)) = fetched {
                model.color_layers.push(ColorLayerModel {
                    layer: id,
                    image: Arc::new(image),
                    matrix: scale_bias(key, &source),
                    source,
                });
            }
        }

        for (id, layer) in map.elevation_layers() {
            if !manifest.includes_elevation(id) || model.elevation.is_some() {
                continue;
            }
            let fetched = Self::fetch_with_fallback(layer.as_ref(), key, io, |k| {
                layer.create_heightfield(k, io)
            });
            if let Some((heightfield, source)) = fetched {
                let matrix = scale_bias(key, &source);
                if self.generate_normal_maps {
                    let normals =
                        create_normal_map(&heightfield, &source.extent(), source.profile());
                    model.normal_map = Some(NormalMapModel {
                        image: Arc::new(normals),
                        matrix,
                        source,
                    });
                }
                model.elevation = Some(ElevationModel {
                    layer: id,
                    heightfield: Arc::new(heightfield),
                    matrix,
                    source,
                });
            }
        }

        if io.is_cancelled() {
            trace!(key = %key, "Tile model discarded after cancellation");
            return TerrainTileModel::default();
        }

        trace!(
            key = %key,
            color_layers = model.color_layers.len(),
            elevation = model.elevation.is_some(),
            "Tile model created"
        );
        model
    }
}
