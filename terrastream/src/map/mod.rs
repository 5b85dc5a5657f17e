//! Layered map model and tile data production.
//!
//! A [`Map`] is an ordered list of image and elevation layers. The terrain
//! engine never talks to layers directly; it asks a [`TileDataFactory`] to
//! assemble a [`TerrainTileModel`](crate::model::TerrainTileModel) for a key.
//!
//! Every mutation bumps the map's revision. The terrain node compares the
//! revision each frame and rebuilds its tile tree when it changes.

mod factory;
mod layer;
mod procedural;

pub use factory::{CreateTileManifest, TerrainTileModelFactory, TileDataFactory};
pub use layer::{ElevationLayer, ImageLayer, LayerError, TileLayer};
pub use procedural::{GradientImageLayer, ProceduralElevationLayer};

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

/// Identifier assigned to a layer when it is added to a map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(u32);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer#{}", self.0)
    }
}

/// A layer of either kind.
#[derive(Clone)]
pub enum Layer {
    Image(Arc<dyn ImageLayer>),
    Elevation(Arc<dyn ElevationLayer>),
}

impl Layer {
    pub fn name(&self) -> &str {
        match self {
            Layer::Image(layer) => layer.name(),
            Layer::Elevation(layer) => layer.name(),
        }
    }

    pub fn is_elevation(&self) -> bool {
        matches!(self, Layer::Elevation(_))
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Image(layer) => write!(f, "Image({})", layer.name()),
            Layer::Elevation(layer) => write!(f, "Elevation({})", layer.name()),
        }
    }
}

/// Ordered collection of layers.
#[derive(Default)]
pub struct Map {
    layers: RwLock<Vec<(LayerId, Layer)>>,
    next_id: AtomicU32,
    revision: AtomicU64,
}

impl Map {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a layer and returns its id.
    pub fn add_layer(&self, layer: Layer) -> LayerId {
        let id = LayerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(layer = layer.name(), id = %id, "Layer added");
        self.layers.write().push((id, layer));
        self.revision.fetch_add(1, Ordering::AcqRel);
        id
    }

    pub fn add_image_layer(&self, layer: Arc<dyn ImageLayer>) -> LayerId {
        self.add_layer(Layer::Image(layer))
    }

    pub fn add_elevation_layer(&self, layer: Arc<dyn ElevationLayer>) -> LayerId {
        self.add_layer(Layer::Elevation(layer))
    }

    /// Removes a layer. Returns `false` if no layer had this id.
    pub fn remove_layer(&self, id: LayerId) -> bool {
        let mut layers = self.layers.write();
        let before = layers.len();
        layers.retain(|(layer_id, _)| *layer_id != id);
        let removed = layers.len() != before;
        drop(layers);

        if removed {
            debug!(id = %id, "Layer removed");
            self.revision.fetch_add(1, Ordering::AcqRel);
        }
        removed
    }

    /// Snapshot of all layers in order.
    pub fn layers(&self) -> Vec<(LayerId, Layer)> {
        self.layers.read().clone()
    }

    pub fn image_layers(&self) -> Vec<(LayerId, Arc<dyn ImageLayer>)> {
        self.layers
            .read()
            .iter()
            .filter_map(|(id, layer)| match layer {
                Layer::Image(image) => Some((*id, Arc::clone(image))),
                Layer::Elevation(_) => None,
            })
            .collect()
    }

    pub fn elevation_layers(&self) -> Vec<(LayerId, Arc<dyn ElevationLayer>)> {
        self.layers
            .read()
            .iter()
            .filter_map(|(id, layer)| match layer {
                Layer::Elevation(elevation) => Some((*id, Arc::clone(elevation))),
                Layer::Image(_) => None,
            })
            .collect()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.read().len()
    }

    /// Counter bumped on every layer change.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("layers", &*self.layers.read())
            .field("revision", &self.revision())
            .finish()
    }
}
