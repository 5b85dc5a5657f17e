//! Shared tile geometry.
//!
//! Every tile with the same mesh configuration draws the same grid, so
//! meshes are built once and handed out as `Arc`s. The pool keeps its own
//! reference; [`GeometryPool::sweep`] drops meshes no tile uses anymore.

mod mesh;

pub use mesh::SharedGeometry;

use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::key::TileKey;

/// Mesh configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometrySettings {
    /// Vertices per tile edge.
    pub tile_size: u32,
    /// Skirt depth relative to tile size; zero disables skirts.
    pub skirt_ratio: f32,
    /// Whether to emit morph targets.
    pub morph_terrain: bool,
}

impl Eq for GeometrySettings {}

impl Hash for GeometrySettings {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tile_size.hash(state);
        self.skirt_ratio.to_bits().hash(state);
        self.morph_terrain.hash(state);
    }
}

/// Counters for pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GeometryPoolStats {
    pub created: u64,
    pub reused: u64,
    pub swept: u64,
    pub resident: usize,
}

/// Cache of shared meshes keyed by configuration.
pub struct GeometryPool {
    enabled: bool,
    geometries: DashMap<GeometrySettings, Arc<SharedGeometry>>,
    created: AtomicU64,
    reused: AtomicU64,
    swept: AtomicU64,
}

impl Default for GeometryPool {
    fn default() -> Self {
        Self::new(true)
    }
}

impl GeometryPool {
    /// Creates a pool. A disabled pool builds a fresh mesh per request.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            geometries: DashMap::new(),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            swept: AtomicU64::new(0),
        }
    }

    /// Returns the mesh for `settings`, building it on first use.
    ///
    /// # Arguments
    ///
    /// * `key` - Tile the mesh is for (used only for tracing)
    /// * `settings` - Mesh configuration
    pub fn get_pooled_geometry(
        &self,
        key: &TileKey,
        settings: &GeometrySettings,
    ) -> Arc<SharedGeometry> {
        if !self.enabled {
            self.created.fetch_add(1, Ordering::Relaxed);
            return Arc::new(SharedGeometry::build(settings));
        }

        if let Some(existing) = self.geometries.get(settings) {
            self.reused.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(existing.value());
        }

        let geometry = self
            .geometries
            .entry(settings.clone())
            .or_insert_with(|| {
                trace!(key = %key, tile_size = settings.tile_size, "Building shared geometry");
                self.created.fetch_add(1, Ordering::Relaxed);
                Arc::new(SharedGeometry::build(settings))
            });
        Arc::clone(geometry.value())
    }

    /// Drops meshes referenced only by the pool. Returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let before = self.geometries.len();
        self.geometries.retain(|_, geometry| Arc::strong_count(geometry) > 1);
        let swept = before.saturating_sub(self.geometries.len());
        if swept > 0 {
            debug!(swept, resident = self.geometries.len(), "Geometry pool swept");
            self.swept.fetch_add(swept as u64, Ordering::Relaxed);
        }
        swept
    }

    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    pub fn clear(&self) {
        self.geometries.clear();
    }

    pub fn stats(&self) -> GeometryPoolStats {
        GeometryPoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            resident: self.geometries.len(),
        }
    }
}
