//! Terrain engine entry point.
//!
//! [`TerrainNode`] owns one paging engine for one map. A frame is two calls
//! on the owning thread:
//!
//! ```text
//!   traverse(camera, frame)   ping visible tiles, collect draw list
//!   update(frame)             run merges/attachments, drain registry
//!                             queues, evict, sweep geometry
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glam::DVec3;
//! use terrastream::job::JobScheduler;
//! use terrastream::key::Profile;
//! use terrastream::map::{GradientImageLayer, Map};
//! use terrastream::runtime::{FrameStamp, Runtime};
//! use terrastream::terrain::{Camera, TerrainNode, TerrainSettings};
//!
//! let map = Arc::new(Map::new());
//! map.add_image_layer(Arc::new(GradientImageLayer::new("imagery", 4)));
//!
//! let mut terrain = TerrainNode::new(
//!     TerrainSettings::default(),
//!     Arc::new(JobScheduler::manual()),
//!     Arc::new(Runtime::default()),
//! );
//! terrain.set_map(map, Profile::GlobalGeodetic).unwrap();
//!
//! let frame = FrameStamp::new(1);
//! terrain.update(&frame);
//! let result = terrain.traverse(&Camera::new(DVec3::new(0.0, 0.0, 50.0), 1e3), &frame);
//! assert_eq!(result.draw_list.len(), 2);
//! ```

mod context;
mod error;
mod settings;
mod traversal;

pub use context::TerrainContext;
pub use error::TerrainError;
pub use settings::{
    TerrainSettings, DEFAULT_LOD_TRANSITION_FACTOR, DEFAULT_MAX_LEVEL_OF_DETAIL,
    DEFAULT_MORPH_RATIO, DEFAULT_SKIRT_RATIO, DEFAULT_TILE_SIZE,
};
pub use traversal::{Camera, TraversalResult};

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::io::IoOptions;
use crate::job::JobScheduler;
use crate::key::Profile;
use crate::map::{Map, TerrainTileModelFactory, TileDataFactory};
use crate::runtime::{FrameStamp, Runtime};
use crate::tile::TerrainTileNode;

struct Engine {
    context: Arc<TerrainContext>,
    roots: Vec<Arc<TerrainTileNode>>,
    map_revision: u64,
}

/// Owner of a terrain paging engine.
pub struct TerrainNode {
    settings: TerrainSettings,
    scheduler: Arc<JobScheduler>,
    runtime: Arc<Runtime>,
    factory: Arc<dyn TileDataFactory>,
    io: IoOptions,
    map: Option<(Arc<Map>, Profile)>,
    engine: Option<Engine>,
    status: Option<TerrainError>,
}

impl TerrainNode {
    /// Creates a node with the default tile model factory.
    ///
    /// Nothing pages until [`set_map`](Self::set_map) is called.
    pub fn new(
        settings: TerrainSettings,
        scheduler: Arc<JobScheduler>,
        runtime: Arc<Runtime>,
    ) -> Self {
        let factory = Arc::new(TerrainTileModelFactory::new(settings.generate_normal_maps));
        Self {
            settings,
            scheduler,
            runtime,
            factory,
            io: IoOptions::default().with_referrer("terrain"),
            map: None,
            engine: None,
            status: None,
        }
    }

    /// Replaces the tile model factory. Takes effect at the next reset.
    pub fn with_factory(mut self, factory: Arc<dyn TileDataFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_io_options(mut self, io: IoOptions) -> Self {
        self.io = io;
        self
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Assigns the map to render. Any existing tiles are discarded; root
    /// tiles are created by the next [`update`](Self::update).
    ///
    /// # Errors
    ///
    /// Returns the settings validation error, which also becomes the status.
    pub fn set_map(&mut self, map: Arc<Map>, profile: Profile) -> Result<(), TerrainError> {
        self.reset();
        self.map = Some((map, profile));
        if let Err(e) = self.settings.validate() {
            self.status = Some(e.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Cancels all outstanding work and drops every tile.
    pub fn reset(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.context.shutdown();
            debug!(roots = engine.roots.len(), "Terrain reset");
        }
        self.status = None;
    }

    /// `Err` while initialization has failed.
    pub fn status(&self) -> Result<(), &TerrainError> {
        match &self.status {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The running engine's shared state, once root tiles exist.
    pub fn context(&self) -> Option<&Arc<TerrainContext>> {
        self.engine.as_ref().map(|engine| &engine.context)
    }

    pub fn root_tiles(&self) -> &[Arc<TerrainTileNode>] {
        self.engine.as_ref().map_or(&[], |engine| engine.roots.as_slice())
    }

    fn create_root_tiles(&mut self) -> Result<(), TerrainError> {
        assert!(
            self.engine.is_none(),
            "create_root_tiles called with root tiles already present"
        );
        let (map, profile) = self.map.as_ref().ok_or(TerrainError::NoMap)?;

        let context = TerrainContext::new(
            self.settings.clone(),
            Arc::clone(map),
            *profile,
            Arc::clone(&self.scheduler),
            Arc::clone(&self.runtime),
            Arc::clone(&self.factory),
        )?;

        let mut roots = Vec::new();
        for key in profile.all_keys_at_level(self.settings.min_level_of_detail) {
            let Some(tile) = context.tiles.create_tile(&key, None, &context) else {
                return Err(TerrainError::invalid(
                    "min_level_of_detail",
                    format!("cannot create root tile {key}"),
                ));
            };
            tile.set_do_not_expire(true);
            context.runtime.backend().compile(&tile);
            roots.push(tile);
        }

        info!(
            profile = %profile,
            roots = roots.len(),
            layers = map.layer_count(),
            "Terrain root tiles created"
        );
        self.engine = Some(Engine {
            context,
            roots,
            map_revision: map.revision(),
        });
        Ok(())
    }

    /// Advances paging by one frame.
    ///
    /// Creates root tiles on the first call after a map is set. Afterwards
    /// runs queued update operations, then the registry update, then the
    /// geometry sweep. A change to the map's layers resets the engine.
    ///
    /// Returns `true` if anything changed.
    pub fn update(&mut self, frame: &FrameStamp) -> bool {
        if self.status.is_some() {
            return false;
        }

        let revision = self.map.as_ref().map(|(map, _)| map.revision());
        let stale = match (&self.engine, revision) {
            (Some(engine), Some(revision)) => engine.map_revision != revision,
            _ => false,
        };
        if stale {
            debug!("Map layers changed, resetting terrain");
            self.reset();
        }

        if self.engine.is_none() {
            if let Err(e) = self.create_root_tiles() {
                warn!(error = %e, "Terrain initialization failed");
                self.status = Some(e);
                return false;
            }
            return true;
        }
        let Some(engine) = &self.engine else {
            return false;
        };

        let context = Arc::clone(&engine.context);
        let mut changes = context.runtime.run_update_operations() > 0;
        if context.tiles.update(frame, &self.io, &context) {
            changes = true;
        }
        context.geometry_pool.sweep();
        changes
    }

    /// Walks the tile tree for `camera`, pinging every tile reached.
    pub fn traverse(&self, camera: &Camera, frame: &FrameStamp) -> TraversalResult {
        match &self.engine {
            Some(engine) => {
                traversal::traverse(&engine.context.tiles, &engine.roots, camera, frame)
            }
            None => TraversalResult::default(),
        }
    }

    /// Forwards a ping to the registry. No-op before root tiles exist.
    pub fn ping(&self, tile: &Arc<TerrainTileNode>, parent: Option<&TerrainTileNode>) {
        if let Some(engine) = &self.engine {
            engine.context.tiles.ping(tile, parent);
        }
    }
}

impl Drop for TerrainNode {
    fn drop(&mut self) {
        self.reset();
    }
}

impl fmt::Debug for TerrainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainNode")
            .field("has_map", &self.map.is_some())
            .field("roots", &self.root_tiles().len())
            .field("status", &self.status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{GradientImageLayer, ProceduralElevationLayer};
    use glam::DVec3;

    fn terrain(settings: TerrainSettings) -> TerrainNode {
        TerrainNode::new(
            settings,
            Arc::new(JobScheduler::manual()),
            Arc::new(Runtime::default()),
        )
    }

    fn map() -> Arc<Map> {
        let map = Arc::new(Map::new());
        map.add_image_layer(Arc::new(GradientImageLayer::new("imagery", 6).with_size(4)));
        map.add_elevation_layer(Arc::new(ProceduralElevationLayer::new("dem", 6).with_size(5)));
        map
    }

    #[test]
    fn test_update_without_map_sets_status() {
        let mut node = terrain(TerrainSettings::default());
        assert!(!node.update(&FrameStamp::new(1)));
        assert_eq!(node.status(), Err(&TerrainError::NoMap));

        node.set_map(map(), Profile::GlobalGeodetic).unwrap();
        assert!(node.status().is_ok());
        assert!(node.update(&FrameStamp::new(2)));
    }

    #[test]
    fn test_invalid_settings_block_paging() {
        let mut node = terrain(TerrainSettings {
            tile_size: 1,
            ..TerrainSettings::default()
        });
        assert!(node.set_map(map(), Profile::GlobalGeodetic).is_err());
        assert!(!node.update(&FrameStamp::new(1)));
        assert!(node.root_tiles().is_empty());
    }

    #[test]
    fn test_roots_created_on_first_update() {
        let mut node = terrain(TerrainSettings {
            min_level_of_detail: 1,
            max_level_of_detail: 4,
            ..TerrainSettings::default()
        });
        node.set_map(map(), Profile::GlobalGeodetic).unwrap();
        node.update(&FrameStamp::new(1));

        let roots = node.root_tiles();
        assert_eq!(roots.len(), 8);
        assert!(roots.iter().all(|t| t.do_not_expire()));
        assert!(roots.iter().all(|t| t.key().level_of_detail() == 1));
    }

    #[test]
    fn test_layer_change_resets_engine() {
        let mut node = terrain(TerrainSettings::default());
        let map = map();
        node.set_map(Arc::clone(&map), Profile::GlobalGeodetic).unwrap();
        node.update(&FrameStamp::new(1));
        let before = Arc::clone(node.context().unwrap());

        map.add_image_layer(Arc::new(GradientImageLayer::new("overlay", 3)));
        assert!(node.update(&FrameStamp::new(2)));

        assert!(before.cancel.is_cancelled());
        assert!(before.tiles.is_empty());
        assert!(!Arc::ptr_eq(&before, node.context().unwrap()));
    }

    /// Records the referrer of every request it serves.
    #[derive(Default)]
    struct RecordingFactory {
        referrers: parking_lot::Mutex<Vec<Option<String>>>,
    }

    impl TileDataFactory for RecordingFactory {
        fn create_tile_model(
            &self,
            _map: &Map,
            _key: &crate::key::TileKey,
            _manifest: &crate::map::CreateTileManifest,
            io: &IoOptions,
        ) -> crate::model::TerrainTileModel {
            self.referrers.lock().push(io.referrer.clone());
            crate::model::TerrainTileModel::default()
        }
    }

    #[test]
    fn test_custom_factory_and_io_options_serve_loads() {
        let scheduler = Arc::new(JobScheduler::manual());
        let factory = Arc::new(RecordingFactory::default());
        let mut node = TerrainNode::new(
            TerrainSettings::default(),
            Arc::clone(&scheduler),
            Arc::new(Runtime::default()),
        )
        .with_factory(factory.clone())
        .with_io_options(IoOptions::default().with_referrer("viewer"));
        node.set_map(map(), Profile::GlobalGeodetic).unwrap();
        node.update(&FrameStamp::new(1));

        for root in node.root_tiles() {
            node.ping(root, None);
        }
        node.update(&FrameStamp::new(2));
        assert_eq!(scheduler.run_pending(), 2);

        let referrers = factory.referrers.lock();
        assert_eq!(referrers.len(), 2);
        assert!(referrers.iter().all(|r| r.as_deref() == Some("viewer")));
    }

    #[test]
    fn test_traverse_far_camera_draws_roots() {
        let mut node = terrain(TerrainSettings::default());
        node.set_map(map(), Profile::GlobalGeodetic).unwrap();
        let frame = FrameStamp::new(1);
        node.update(&frame);

        let camera = Camera::new(DVec3::new(0.0, 0.0, 1.0e6), 1.0e7);
        let result = node.traverse(&camera, &frame);
        assert_eq!(result.visited, 2);
        assert_eq!(result.draw_list.len(), 2);
        assert!(node.root_tiles().iter().all(|t| !t.needs_children()));
    }

    #[test]
    fn test_traverse_near_camera_requests_children() {
        let mut node = terrain(TerrainSettings::default());
        node.set_map(map(), Profile::GlobalGeodetic).unwrap();
        let frame = FrameStamp::new(1);
        node.update(&frame);

        let camera = Camera::new(DVec3::new(-90.0, 0.0, 1.0), 1.0e7);
        node.traverse(&camera, &frame);
        let west = &node.root_tiles()[0];
        assert!(west.needs_children());
    }
}
