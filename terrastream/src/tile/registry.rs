//! Key-to-tile registry and the per-frame paging cycle.
//!
//! The registry is the arena that owns every live tile. Traversal *pings*
//! tiles; each ping refreshes the tile in the [`Tracker`] and queues whatever
//! work the tile is ready for. [`TileRegistry::update`] then drains the
//! queues and flushes the tracker:
//!
//! ```text
//!   ping ──► tracker.touch ──► queue work ───────────────┐
//!                                                       ▼
//!   update ──► update_data ──► load_children ──► load/merge elevation
//!                                                       │
//!              tracker.flush ◄── merge_data ◄── load_data
//! ```
//!
//! Work on a tile is gated on its parent: a tile only loads data once the
//! parent's data is merged, and only asks for children once its own data is
//! merged. Detail therefore always arrives coarse to fine.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::node::{QuadGroup, SceneNode, TerrainTileNode, TileSlots};
use crate::io::IoOptions;
use crate::job::{DispatchOptions, JobFuture, PriorityFn};
use crate::key::TileKey;
use crate::map::CreateTileManifest;
use crate::model::TerrainTileModel;
use crate::runtime::FrameStamp;
use crate::terrain::TerrainContext;
use crate::tracker::{Tracker, TrackerToken};

/// Priority scale applied to elevation work in split mode.
const ELEVATION_PRIORITY_FACTOR: f32 = 0.9;

struct TableEntry {
    tile: Arc<TerrainTileNode>,
    token: TrackerToken,
}

#[derive(Default)]
struct WorkQueues {
    update_data: Vec<Arc<TerrainTileNode>>,
    load_children: Vec<Arc<TerrainTileNode>>,
    load_elevation: Vec<Arc<TerrainTileNode>>,
    load_data: Vec<Arc<TerrainTileNode>>,
    merge_elevation: Vec<Arc<TerrainTileNode>>,
    merge_data: Vec<Arc<TerrainTileNode>>,
}

impl WorkQueues {
    fn lengths(&self) -> QueueLengths {
        QueueLengths {
            update_data: self.update_data.len(),
            load_children: self.load_children.len(),
            load_elevation: self.load_elevation.len(),
            load_data: self.load_data.len(),
            merge_elevation: self.merge_elevation.len(),
            merge_data: self.merge_data.len(),
        }
    }
}

/// Sizes of the work queues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueLengths {
    pub update_data: usize,
    pub load_children: usize,
    pub load_elevation: usize,
    pub load_data: usize,
    pub merge_elevation: usize,
    pub merge_data: usize,
}

impl QueueLengths {
    pub fn total(&self) -> usize {
        self.update_data
            + self.load_children
            + self.load_elevation
            + self.load_data
            + self.merge_elevation
            + self.merge_data
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    children_requested: u64,
    loads_requested: u64,
    merges_requested: u64,
    evicted: u64,
    updates: u64,
}

/// Snapshot of registry state and cumulative counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Tiles in the key map.
    pub tiles: usize,
    /// Tiles in the tracker.
    pub tracked: usize,
    /// Queue sizes drained by the most recent update.
    pub queued: QueueLengths,
    pub children_requested: u64,
    pub loads_requested: u64,
    pub merges_requested: u64,
    pub evicted: u64,
    /// Calls into tiles' `update` hook.
    pub updates: u64,
}

struct RegistryState {
    tiles: HashMap<TileKey, TableEntry>,
    tracker: Tracker<TileKey>,
    queues: WorkQueues,
    last_queued: QueueLengths,
    counters: Counters,
}

/// Owner of all live tiles.
pub struct TileRegistry {
    state: Mutex<RegistryState>,
    load_elevation_separately: bool,
    max_dispose: usize,
}

impl TileRegistry {
    /// # Arguments
    ///
    /// * `load_elevation_separately` - Load elevation and imagery as two
    ///   independent requests instead of one combined request
    /// * `max_dispose` - Upper bound on evictions per update
    pub fn new(load_elevation_separately: bool, max_dispose: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                tiles: HashMap::new(),
                tracker: Tracker::new(),
                queues: WorkQueues::default(),
                last_queued: QueueLengths::default(),
                counters: Counters::default(),
            }),
            load_elevation_separately,
            max_dispose,
        }
    }

    pub fn load_elevation_separately(&self) -> bool {
        self.load_elevation_separately
    }

    // =========================================================================
    // Ping
    // =========================================================================

    /// Records that `tile` is in use this frame and queues whatever work it
    /// is ready for.
    ///
    /// `parent` is the tile's parent in the scene graph, or `None` for roots.
    /// Must be called from the traversal, once per visited tile per frame.
    pub fn ping(&self, tile: &Arc<TerrainTileNode>, parent: Option<&TerrainTileNode>) {
        let split = self.load_elevation_separately;

        // Parent gates are read before taking any lock of our own.
        let (parent_has_data, parent_has_elevation) = match parent {
            None => (true, true),
            Some(parent) => {
                let slots = parent.slots();
                let data = slots.data_merger.is_available();
                let elevation = if split {
                    slots.elevation_merger.is_available()
                } else {
                    data
                };
                (data, elevation)
            }
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let key = *tile.key();

        match state.tiles.get_mut(&key) {
            Some(entry) => {
                entry.token = state.tracker.touch(key, Some(entry.token));
                if !Arc::ptr_eq(&entry.tile, tile) {
                    entry.tile = Arc::clone(tile);
                }
            }
            None => {
                let token = state.tracker.touch(key, None);
                state.tiles.insert(
                    key,
                    TableEntry {
                        tile: Arc::clone(tile),
                        token,
                    },
                );
            }
        }

        let slots = tile.slots();
        let queues = &mut state.queues;

        let tile_has_data = slots.data_merger.is_available();
        let tile_has_elevation = if split {
            slots.elevation_merger.is_available()
        } else {
            tile_has_data
        };

        if tile_has_data && tile_has_elevation && tile.needs_children() {
            queues.load_children.push(Arc::clone(tile));
        }

        if split && parent_has_elevation && slots.elevation_loader.is_empty() {
            queues.load_elevation.push(Arc::clone(tile));
        }

        if parent_has_data && slots.data_loader.is_empty() {
            queues.load_data.push(Arc::clone(tile));
        }

        if split && slots.elevation_loader.is_available() && slots.elevation_merger.is_empty() {
            queues.merge_elevation.push(Arc::clone(tile));
        }

        if slots.data_loader.is_available() && slots.data_merger.is_empty() {
            queues.merge_data.push(Arc::clone(tile));
        }

        if tile.needs_update() {
            queues.update_data.push(Arc::clone(tile));
        }
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Drains the work queues and evicts tiles that were not pinged since the
    /// previous update.
    ///
    /// Returns `true` if any work was issued or any tile was evicted.
    pub fn update(
        &self,
        frame: &FrameStamp,
        io: &IoOptions,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        let queues = {
            let mut state = self.state.lock();
            state.last_queued = state.queues.lengths();
            std::mem::take(&mut state.queues)
        };
        let mut changes = 0usize;
        let mut counters = Counters::default();

        for tile in &queues.update_data {
            if tile.update(frame, io) {
                counters.updates += 1;
                changes += 1;
            }
        }

        for tile in &queues.load_children {
            if self.request_load_children(tile, terrain) {
                counters.children_requested += 1;
                changes += 1;
            }
            tile.set_needs_children(false);
        }

        if self.load_elevation_separately {
            for tile in &queues.load_elevation {
                if self.request_load_elevation(tile, io, terrain) {
                    counters.loads_requested += 1;
                    changes += 1;
                }
            }
            for tile in &queues.merge_elevation {
                if self.request_merge_elevation(tile, terrain) {
                    counters.merges_requested += 1;
                    changes += 1;
                }
            }
        }

        for tile in &queues.load_data {
            if self.request_load_data(tile, io, terrain) {
                counters.loads_requested += 1;
                changes += 1;
            }
        }

        for tile in &queues.merge_data {
            if self.request_merge_data(tile, terrain) {
                counters.merges_requested += 1;
                changes += 1;
            }
        }
        drop(queues);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let tiles = &mut state.tiles;
        let evicted = state
            .tracker
            .flush(self.max_dispose, |key| Self::dispose(tiles, key));
        counters.evicted += evicted as u64;
        changes += evicted;

        let total = &mut state.counters;
        total.children_requested += counters.children_requested;
        total.loads_requested += counters.loads_requested;
        total.merges_requested += counters.merges_requested;
        total.evicted += counters.evicted;
        total.updates += counters.updates;

        if evicted > 0 {
            debug!(
                frame = frame.frame_number,
                evicted,
                remaining = tiles.len(),
                "Evicted unused tiles"
            );
        }
        trace!(frame = frame.frame_number, changes, "Registry update complete");
        changes > 0
    }

    /// Eviction callback for the tracker.
    fn dispose(tiles: &mut HashMap<TileKey, TableEntry>, key: &TileKey) -> bool {
        let Some(entry) = tiles.get(key) else {
            return true;
        };
        if entry.tile.do_not_expire() {
            return false;
        }
        if let Some(parent) = key.create_parent_key().and_then(|k| tiles.get(&k)) {
            parent.tile.unload_children();
        }
        tiles.remove(key);
        trace!(key = %key, "Tile disposed");
        true
    }

    // =========================================================================
    // Tile creation and lookup
    // =========================================================================

    /// Builds a tile for `key`. The tile is not registered until first pinged.
    ///
    /// Returns `None` if the key lies beyond the configured levels.
    pub fn create_tile(
        &self,
        key: &TileKey,
        parent: Option<&Arc<TerrainTileNode>>,
        terrain: &TerrainContext,
    ) -> Option<Arc<TerrainTileNode>> {
        let Some(range) = terrain.selection.get(key) else {
            warn!(key = %key, "No level of detail configured for tile");
            return None;
        };

        let geometry = terrain
            .geometry_pool
            .get_pooled_geometry(key, &terrain.settings.geometry_settings());

        let children_visibility_range = if key.level_of_detail() < terrain.selection.max_level() {
            terrain
                .selection
                .get(&key.create_child_key(0))
                .map_or(0.0, |lod| lod.visibility_range)
        } else {
            0.0
        };

        let tile = Arc::new(TerrainTileNode::new(
            *key,
            geometry,
            range.morph_constants(),
            children_visibility_range,
        ));

        if let Some(parent) = parent {
            tile.inherit_from(parent);
        }
        tile.recompute_bound();
        terrain
            .runtime
            .backend()
            .update_descriptors(key, &tile.render_model());

        Some(tile)
    }

    pub fn get_tile(&self, key: &TileKey) -> Option<Arc<TerrainTileNode>> {
        self.state
            .lock()
            .tiles
            .get(key)
            .map(|entry| Arc::clone(&entry.tile))
    }

    /// Every registered tile, in no particular order.
    pub fn tiles(&self) -> Vec<Arc<TerrainTileNode>> {
        self.state
            .lock()
            .tiles
            .values()
            .map(|entry| Arc::clone(&entry.tile))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lengths of the queues as they stand now.
    pub fn queued(&self) -> QueueLengths {
        self.state.lock().queues.lengths()
    }

    /// Drops every tile, tracker entry and queued request.
    pub fn release_all(&self) {
        let released = {
            let mut state = self.state.lock();
            state.tracker.clear();
            state.queues = WorkQueues::default();
            std::mem::take(&mut state.tiles)
        };
        debug!(tiles = released.len(), "Released all tiles");
    }

    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            tiles: state.tiles.len(),
            tracked: state.tracker.len(),
            queued: state.last_queued,
            children_requested: state.counters.children_requested,
            loads_requested: state.counters.loads_requested,
            merges_requested: state.counters.merges_requested,
            evicted: state.counters.evicted,
            updates: state.counters.updates,
        }
    }

    // =========================================================================
    // Requests
    // =========================================================================

    fn priority(tile: &Arc<TerrainTileNode>, factor: f32) -> PriorityFn {
        let weak = Arc::downgrade(tile);
        Arc::new(move || match weak.upgrade() {
            Some(tile) => {
                let level = tile.key().level_of_detail() as f32;
                -(tile.last_traversal_range().sqrt() * factor * level)
            }
            None => 0.0,
        })
    }

    fn request_load_children(
        &self,
        parent: &Arc<TerrainTileNode>,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        let mut slots = parent.slots();
        if !slots.children_loader.is_empty() {
            return false;
        }

        let key = *parent.key();
        let weak_parent = Arc::downgrade(parent);
        let weak_terrain = Arc::downgrade(terrain);
        let options = DispatchOptions::named(format!("create children {key}"))
            .with_priority(Self::priority(parent, 1.0))
            .with_cancel_parent(&terrain.cancel);

        slots.children_loader = terrain.scheduler.dispatch(options, move |token| {
            create_children(&weak_parent, &weak_terrain, token)
        });
        debug!(key = %key, "Requested children");
        true
    }

    fn request_load_data(
        &self,
        tile: &Arc<TerrainTileNode>,
        io: &IoOptions,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        let manifest = if self.load_elevation_separately {
            CreateTileManifest::images_only()
        } else {
            CreateTileManifest::all()
        };
        let mut slots = tile.slots();
        if !slots.data_loader.is_empty() {
            return false;
        }
        slots.data_loader = self.dispatch_load("load data", tile, manifest, 1.0, io, terrain);
        true
    }

    fn request_load_elevation(
        &self,
        tile: &Arc<TerrainTileNode>,
        io: &IoOptions,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        let mut slots = tile.slots();
        if !slots.elevation_loader.is_empty() {
            return false;
        }
        slots.elevation_loader = self.dispatch_load(
            "load elevation",
            tile,
            CreateTileManifest::elevation_only(),
            ELEVATION_PRIORITY_FACTOR,
            io,
            terrain,
        );
        true
    }

    fn dispatch_load(
        &self,
        label: &str,
        tile: &Arc<TerrainTileNode>,
        manifest: CreateTileManifest,
        priority_factor: f32,
        io: &IoOptions,
        terrain: &Arc<TerrainContext>,
    ) -> JobFuture<TerrainTileModel> {
        let key = *tile.key();
        let io = io.clone();
        let weak_terrain = Arc::downgrade(terrain);
        let options = DispatchOptions::named(format!("{label} {key}"))
            .with_priority(Self::priority(tile, priority_factor))
            .with_cancel_parent(&terrain.cancel);

        trace!(key = %key, job = label, "Dispatching load");
        terrain.scheduler.dispatch(options, move |token| {
            if token.is_cancelled() {
                return TerrainTileModel::default();
            }
            match weak_terrain.upgrade() {
                Some(terrain) => terrain.factory.create_tile_model(
                    &terrain.map,
                    &key,
                    &manifest,
                    &io.with_cancel(token.clone()),
                ),
                None => TerrainTileModel::default(),
            }
        })
    }

    fn request_merge_data(
        &self,
        tile: &Arc<TerrainTileNode>,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        let split = self.load_elevation_separately;
        self.dispatch_merge(
            "merge data",
            tile,
            1.0,
            terrain,
            move |tile, model| {
                let mut updated = tile.merge_color(model);
                if !split {
                    updated |= tile.merge_elevation(model);
                }
                updated
            },
            |slots| &mut slots.data_merger,
            |slots| slots.data_loader.get(),
        )
    }

    fn request_merge_elevation(
        &self,
        tile: &Arc<TerrainTileNode>,
        terrain: &Arc<TerrainContext>,
    ) -> bool {
        self.dispatch_merge(
            "merge elevation",
            tile,
            ELEVATION_PRIORITY_FACTOR,
            terrain,
            |tile, model| tile.merge_elevation(model),
            |slots| &mut slots.elevation_merger,
            |slots| slots.elevation_loader.get(),
        )
    }

    /// Schedules a frame-synchronous merge of a loaded model into `tile`.
    ///
    /// `slot` selects the merger slot guarding the request and `source`
    /// reads the loaded model when the merge runs.
    fn dispatch_merge<M, S, L>(
        &self,
        label: &str,
        tile: &Arc<TerrainTileNode>,
        priority_factor: f32,
        terrain: &Arc<TerrainContext>,
        merge: M,
        slot: S,
        source: L,
    ) -> bool
    where
        M: FnOnce(&TerrainTileNode, &TerrainTileModel) -> bool + Send + 'static,
        S: FnOnce(&mut TileSlots) -> &mut JobFuture<bool>,
        L: FnOnce(&TileSlots) -> Option<Arc<TerrainTileModel>> + Send + 'static,
    {
        let mut slots = tile.slots();
        let merger = slot(&mut *slots);
        if !merger.is_empty() {
            return false;
        }

        let key = *tile.key();
        let weak_terrain = Arc::downgrade(terrain);
        let options = DispatchOptions::named(format!("{label} {key}"))
            .with_priority(Self::priority(tile, priority_factor))
            .with_cancel_parent(&terrain.cancel);

        *merger = terrain.runtime.run_during_update(options, move |token| {
            if token.is_cancelled() {
                return false;
            }
            let Some(terrain) = weak_terrain.upgrade() else {
                return false;
            };
            let Some(tile) = terrain.tiles.get_tile(&key) else {
                debug!(key = %key, "Merge target no longer registered");
                return false;
            };
            let model = source(&*tile.slots());
            let updated = match model {
                Some(model) => merge(&tile, &model),
                None => false,
            };
            if updated {
                terrain
                    .runtime
                    .backend()
                    .update_descriptors(&key, &tile.render_model());
            }
            true
        });
        true
    }
}

/// Builds all four children of a tile and queues their attachment.
///
/// Runs on a scheduler worker. Cancellation or a failed child aborts the
/// whole group.
fn create_children(
    weak_parent: &Weak<TerrainTileNode>,
    weak_terrain: &Weak<TerrainContext>,
    token: &CancellationToken,
) -> bool {
    let (Some(parent), Some(terrain)) = (weak_parent.upgrade(), weak_terrain.upgrade()) else {
        return false;
    };
    let key = *parent.key();

    let mut children = Vec::with_capacity(4);
    for quadrant in 0..4 {
        if token.is_cancelled() {
            return false;
        }
        let child_key = key.create_child_key(quadrant);
        match terrain.tiles.create_tile(&child_key, Some(&parent), &terrain) {
            Some(child) => children.push(child),
            None => return false,
        }
    }
    let Ok(quad) = QuadGroup::try_from(children) else {
        return false;
    };
    if token.is_cancelled() {
        return false;
    }

    for child in &quad {
        terrain.runtime.backend().compile(child);
    }

    let attach_token = token.clone();
    let attach_parent = Weak::clone(weak_parent);
    terrain.runtime.post(format!("attach children {key}"), move || {
        if attach_token.is_cancelled() {
            return;
        }
        if let Some(parent) = attach_parent.upgrade() {
            if parent.attach_children(quad) {
                trace!(key = %key, "Attached children");
            }
        }
    });
    true
}

impl fmt::Debug for TileRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TileRegistry")
            .field("tiles", &state.tiles.len())
            .field("tracked", &state.tracker.len())
            .field("load_elevation_separately", &self.load_elevation_separately)
            .finish()
    }
}
