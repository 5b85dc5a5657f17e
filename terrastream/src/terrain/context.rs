//! Shared state of one running terrain engine.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::TerrainError;
use super::settings::TerrainSettings;
use crate::geometry::GeometryPool;
use crate::job::JobScheduler;
use crate::key::Profile;
use crate::map::{Map, TileDataFactory};
use crate::runtime::Runtime;
use crate::tile::{SelectionInfo, TileRegistry};

/// Everything the paging machinery needs, handed to jobs by `Weak` reference.
///
/// Built when root tiles are created and discarded on reset. All jobs
/// dispatched for this engine observe `cancel`.
pub struct TerrainContext {
    pub settings: TerrainSettings,
    pub map: Arc<Map>,
    pub profile: Profile,
    pub scheduler: Arc<JobScheduler>,
    pub runtime: Arc<Runtime>,
    pub factory: Arc<dyn TileDataFactory>,
    pub geometry_pool: GeometryPool,
    pub selection: SelectionInfo,
    pub tiles: TileRegistry,
    /// Root of every token this engine hands out.
    pub cancel: CancellationToken,
}

impl TerrainContext {
    /// # Errors
    ///
    /// Returns [`TerrainError::InvalidSettings`] if `settings` fail validation.
    pub fn new(
        settings: TerrainSettings,
        map: Arc<Map>,
        profile: Profile,
        scheduler: Arc<JobScheduler>,
        runtime: Arc<Runtime>,
        factory: Arc<dyn TileDataFactory>,
    ) -> Result<Arc<Self>, TerrainError> {
        settings.validate()?;

        let selection = SelectionInfo::new(
            profile,
            settings.min_level_of_detail,
            settings.max_level_of_detail,
            settings.lod_transition_factor,
            settings.morph_ratio,
        );
        let tiles = TileRegistry::new(settings.load_elevation_separately, settings.max_dispose());
        let geometry_pool = GeometryPool::new(settings.enable_geometry_pool);

        debug!(
            profile = %profile,
            min_level = settings.min_level_of_detail,
            max_level = settings.max_level_of_detail,
            split_elevation = settings.load_elevation_separately,
            "Terrain context created"
        );

        Ok(Arc::new(Self {
            settings,
            map,
            profile,
            scheduler,
            runtime,
            factory,
            geometry_pool,
            selection,
            tiles,
            cancel: CancellationToken::new(),
        }))
    }

    /// Cancels all outstanding work and drops every tile.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.tiles.release_all();
        self.scheduler.purge_cancelled();
        self.runtime.purge_cancelled();
        self.geometry_pool.clear();
    }
}

impl fmt::Debug for TerrainContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainContext")
            .field("profile", &self.profile)
            .field("tiles", &self.tiles)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
