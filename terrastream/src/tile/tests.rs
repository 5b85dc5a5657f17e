use std::sync::Arc;

use super::*;
use crate::io::IoOptions;
use crate::job::{JobFuture, JobScheduler, Promise};
use crate::key::{Profile, TileKey};
use crate::map::{GradientImageLayer, Map, ProceduralElevationLayer, TerrainTileModelFactory};
use crate::model::TerrainTileModel;
use crate::runtime::{CountingRenderBackend, FrameStamp, Runtime};
use crate::terrain::{TerrainContext, TerrainSettings};

// =============================================================================
// Helpers
// =============================================================================

struct Harness {
    terrain: Arc<TerrainContext>,
    backend: Arc<CountingRenderBackend>,
    frame: FrameStamp,
}

impl Harness {
    fn new(split: bool) -> Self {
        let map = Map::new();
        map.add_image_layer(Arc::new(GradientImageLayer::new("imagery", 6).with_size(4)));
        map.add_elevation_layer(Arc::new(ProceduralElevationLayer::new("dem", 6).with_size(5)));
        Self::with_map(map, split)
    }

    fn with_map(map: Map, split: bool) -> Self {
        let settings = TerrainSettings {
            tile_size: 5,
            max_level_of_detail: 6,
            load_elevation_separately: split,
            ..TerrainSettings::default()
        };
        let backend = Arc::new(CountingRenderBackend::default());
        let terrain = TerrainContext::new(
            settings,
            Arc::new(map),
            Profile::GlobalGeodetic,
            Arc::new(JobScheduler::manual()),
            Arc::new(Runtime::new(backend.clone())),
            Arc::new(TerrainTileModelFactory::default()),
        )
        .unwrap();
        Self {
            terrain,
            backend,
            frame: FrameStamp::new(0),
        }
    }

    fn tiles(&self) -> &TileRegistry {
        &self.terrain.tiles
    }

    fn root(&self) -> Arc<TerrainTileNode> {
        let key = TileKey::new(0, 0, 0, Profile::GlobalGeodetic);
        let tile = self.tiles().create_tile(&key, None, &self.terrain).unwrap();
        tile.set_do_not_expire(true);
        tile
    }

    /// Builds and attaches all four children of `parent`.
    fn attach_children(&self, parent: &Arc<TerrainTileNode>) -> QuadGroup {
        let quad: QuadGroup = std::array::from_fn(|q| {
            let key = parent.key().create_child_key(q as u32);
            self.tiles()
                .create_tile(&key, Some(parent), &self.terrain)
                .unwrap()
        });
        assert!(parent.attach_children(quad.clone()));
        quad
    }

    /// Runs update operations, then the registry update.
    fn update(&mut self) -> bool {
        self.frame = self.frame.next();
        self.terrain.runtime.run_update_operations();
        self.tiles()
            .update(&self.frame, &IoOptions::default(), &self.terrain)
    }

    /// Pings `tiles` with their parents, then updates.
    fn frame(
        &mut self,
        pings: &[(&Arc<TerrainTileNode>, Option<&Arc<TerrainTileNode>>)],
    ) -> bool {
        for (tile, parent) in pings {
            self.tiles().ping(tile, parent.map(|p| &**p));
        }
        self.update()
    }

    fn run_jobs(&self) -> usize {
        self.terrain.scheduler.run_pending()
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_single_root_remains_with_empty_queues() {
    let mut h = Harness::new(false);
    let root = h.root();

    h.frame(&[(&root, None)]);
    for _ in 0..3 {
        h.update();
    }

    assert_eq!(h.tiles().len(), 1);
    assert!(h.tiles().get_tile(root.key()).is_some());
    assert_eq!(h.tiles().queued().total(), 0);
    assert_eq!(h.tiles().stats().evicted, 0);
}

#[test]
fn test_ready_root_dispatches_children_once() {
    let mut h = Harness::new(false);
    let root = h.root();
    {
        let mut slots = root.slots();
        slots.data_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_merger = JobFuture::resolved(true);
    }
    root.set_needs_children(true);

    h.frame(&[(&root, None), (&root, None)]);

    assert_eq!(h.tiles().stats().children_requested, 1);
    assert!(!root.needs_children());
    assert!(root.slots().children_loader.is_working());
    assert_eq!(
        h.terrain.scheduler.pending_job_names(),
        vec!["create children 0/0/0".to_string()]
    );

    // Asking again while the first request is in flight changes nothing.
    root.set_needs_children(true);
    h.frame(&[(&root, None)]);
    assert_eq!(h.tiles().stats().children_requested, 1);
    assert_eq!(h.terrain.scheduler.pending(), 1);
}

#[test]
fn test_split_mode_merges_elevation_before_data_arrives() {
    let mut h = Harness::new(true);
    let root = h.root();
    let (_data_promise, data_future) = Promise::<TerrainTileModel>::new();
    {
        let mut slots = root.slots();
        slots.elevation_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_loader = data_future;
    }

    h.tiles().ping(&root, None);
    let queued = h.tiles().queued();
    assert_eq!(queued.merge_elevation, 1);
    assert_eq!(queued.merge_data, 0);
    assert_eq!(queued.load_data, 0);
    assert_eq!(queued.load_elevation, 0);

    h.update();
    assert_eq!(
        h.terrain.runtime.pending_operation_names(),
        vec!["merge elevation 0/0/0".to_string()]
    );
    assert!(root.slots().data_merger.is_empty());
}

#[test]
fn test_unpinged_child_is_evicted_and_unlinked() {
    let mut h = Harness::new(false);
    let root = h.root();
    let quad = h.attach_children(&root);

    for _ in 0..10 {
        let mut pings = vec![(&root, None)];
        pings.extend(quad.iter().map(|c| (c, Some(&root))));
        h.frame(&pings);
    }
    assert_eq!(h.tiles().len(), 5);
    assert!(root.has_children());

    h.frame(&[(&root, None)]);

    assert!(!root.has_children());
    assert_eq!(h.tiles().len(), 1);
    for child in &quad {
        assert!(h.tiles().get_tile(child.key()).is_none());
    }
    assert_eq!(h.tiles().stats().evicted, 4);
}

#[test]
fn test_sibling_eviction_leaves_other_siblings_tracked() {
    let mut h = Harness::new(false);
    let root = h.root();
    let quad = h.attach_children(&root);

    for _ in 0..2 {
        h.frame(&[
            (&root, None),
            (&quad[0], Some(&root)),
            (&quad[1], Some(&root)),
            (&quad[2], Some(&root)),
            (&quad[3], Some(&root)),
        ]);
    }

    let survivors = [
        (&root, None),
        (&quad[0], Some(&root)),
        (&quad[1], Some(&root)),
        (&quad[2], Some(&root)),
    ];
    h.frame(&survivors);
    assert!(h.tiles().get_tile(quad[3].key()).is_none());
    assert!(!root.has_children());

    h.frame(&survivors);
    let stats = h.tiles().stats();
    assert_eq!(stats.evicted, 1);
    assert_eq!(stats.tracked, 4);
    for sibling in &quad[..3] {
        assert!(h.tiles().get_tile(sibling.key()).is_some());
    }
}

// =============================================================================
// Invariants
// =============================================================================

#[test]
fn test_child_loads_wait_for_parent_merge() {
    let mut h = Harness::new(false);
    let root = h.root();
    let quad = h.attach_children(&root);
    let child = &quad[0];

    for _ in 0..6 {
        let parent_merged = root.slots().data_merger.is_available();
        if !parent_merged {
            assert!(child.slots().data_loader.is_empty());
        }
        h.frame(&[(&root, None), (child, Some(&root))]);
        h.run_jobs();
    }

    assert!(root.slots().data_merger.is_available());
    assert!(!child.slots().data_loader.is_empty());
}

#[test]
fn test_split_mode_gates_elevation_on_parent_elevation() {
    let h = Harness::new(true);
    let root = h.root();
    let quad = h.attach_children(&root);
    let child = &quad[0];

    // Parent data merged, parent elevation not: child may load imagery only.
    {
        let mut slots = root.slots();
        slots.data_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_merger = JobFuture::resolved(true);
    }
    h.tiles().ping(child, Some(&root));
    let queued = h.tiles().queued();
    assert_eq!(queued.load_data, 1);
    assert_eq!(queued.load_elevation, 0);
}

#[test]
fn test_repeated_pings_issue_one_load() {
    let mut h = Harness::new(false);
    let root = h.root();

    for _ in 0..5 {
        h.tiles().ping(&root, None);
    }
    assert_eq!(h.tiles().queued().load_data, 5);
    h.update();
    assert_eq!(h.terrain.scheduler.pending(), 1);

    for _ in 0..3 {
        h.frame(&[(&root, None), (&root, None)]);
    }
    assert_eq!(h.terrain.scheduler.pending(), 1);
    assert_eq!(h.tiles().stats().loads_requested, 1);
}

#[test]
fn test_tiles_pinged_every_pass_are_never_evicted() {
    let mut h = Harness::new(false);
    let keys = Profile::GlobalGeodetic.all_keys_at_level(3);
    let tiles: Vec<_> = keys
        .iter()
        .map(|key| h.tiles().create_tile(key, None, &h.terrain).unwrap())
        .collect();
    assert_eq!(tiles.len(), 128);

    for _ in 0..5 {
        let pings: Vec<_> = tiles.iter().map(|t| (t, None)).collect();
        h.frame(&pings);
    }
    assert_eq!(h.tiles().len(), 128);
    assert_eq!(h.tiles().stats().evicted, 0);

    // Drop half; they go after one pass.
    let kept: Vec<_> = tiles.iter().step_by(2).map(|t| (t, None)).collect();
    h.frame(&kept);
    assert_eq!(h.tiles().len(), 64);
}

#[test]
fn test_max_dispose_spreads_eviction() {
    let h = Harness::new(false);
    let keys = Profile::GlobalGeodetic.all_keys_at_level(2);
    let registry = TileRegistry::new(false, 10);
    let tiles: Vec<_> = keys
        .iter()
        .map(|key| h.tiles().create_tile(key, None, &h.terrain).unwrap())
        .collect();
    for tile in &tiles {
        registry.ping(tile, None);
    }
    let io = IoOptions::default();
    registry.update(&FrameStamp::new(1), &io, &h.terrain);
    registry.update(&FrameStamp::new(2), &io, &h.terrain);
    assert_eq!(registry.len(), 32 - 10);
    registry.update(&FrameStamp::new(3), &io, &h.terrain);
    assert_eq!(registry.len(), 32 - 20);
}

// =============================================================================
// Pipeline
// =============================================================================

#[test]
fn test_combined_load_and_merge_fill_render_model() {
    let mut h = Harness::new(false);
    let root = h.root();
    let creation_updates = h.backend.descriptor_updates();

    h.frame(&[(&root, None)]);
    assert_eq!(h.run_jobs(), 1);
    assert!(root.slots().data_loader.is_available());

    h.frame(&[(&root, None)]);
    assert!(root.slots().data_merger.is_working());
    assert!(root.render_model().color.is_none());

    // The merge runs at the start of the next update.
    h.frame(&[(&root, None)]);
    assert!(root.slots().data_merger.is_available());
    let model = root.render_model();
    assert!(model.color.is_some());
    assert!(model.elevation.is_some());
    assert!(model.normal.is_some());
    assert!(root.needs_update());
    assert_eq!(h.backend.descriptor_updates(), creation_updates + 1);

    // The next ping runs the tile's update hook, which refreshes the bound.
    h.frame(&[(&root, None)]);
    assert!(!root.needs_update());
    assert!(h.tiles().stats().updates >= 1);
}

#[test]
fn test_split_mode_data_merge_installs_color_only() {
    let mut h = Harness::new(true);
    let root = h.root();

    h.frame(&[(&root, None)]);
    assert_eq!(h.terrain.scheduler.pending(), 2);
    h.run_jobs();
    h.frame(&[(&root, None)]);
    h.frame(&[(&root, None)]);

    let slots = root.slots();
    assert!(slots.data_merger.is_available());
    assert!(slots.elevation_merger.is_available());
    let data = slots.data_loader.get().unwrap();
    assert!(!data.color_layers.is_empty());
    assert!(data.elevation.is_none());
    drop(slots);

    let model = root.render_model();
    assert!(model.color.is_some());
    assert!(model.elevation.is_some());
}

#[test]
fn test_children_are_built_compiled_and_attached() {
    let mut h = Harness::new(false);
    let root = h.root();
    {
        let mut slots = root.slots();
        slots.data_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_merger = JobFuture::resolved(true);
    }
    root.set_needs_children(true);
    h.frame(&[(&root, None)]);

    h.run_jobs();
    assert!(root.slots().children_loader.is_available());
    assert_eq!(h.backend.compiled(), 4);
    assert!(!root.has_children());

    h.update();
    let children = root.children().unwrap();
    for (quadrant, child) in children.iter().enumerate() {
        assert_eq!(*child.key(), root.key().create_child_key(quadrant as u32));
        assert!(child.children_visibility_range() > 0.0);
    }
    // Children are registered when first pinged, not when built.
    assert_eq!(h.tiles().len(), 1);
}

#[test]
fn test_unloading_children_cancels_pending_build() {
    let mut h = Harness::new(false);
    let root = h.root();
    {
        let mut slots = root.slots();
        slots.data_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_merger = JobFuture::resolved(true);
    }
    root.set_needs_children(true);
    h.frame(&[(&root, None)]);
    assert_eq!(h.terrain.scheduler.pending(), 1);

    root.unload_children();
    assert_eq!(h.run_jobs(), 0);
    assert_eq!(h.terrain.scheduler.stats().canceled, 1);
    assert_eq!(h.backend.compiled(), 0);
    assert!(root.slots().children_loader.is_empty());
}

#[test]
fn test_children_past_max_level_abort_whole_group() {
    let mut h = Harness::new(false);
    let key = TileKey::new(6, 10, 5, Profile::GlobalGeodetic);
    let tile = h.tiles().create_tile(&key, None, &h.terrain).unwrap();
    {
        let mut slots = tile.slots();
        slots.data_loader = JobFuture::resolved(TerrainTileModel::default());
        slots.data_merger = JobFuture::resolved(true);
    }
    tile.set_needs_children(true);
    h.frame(&[(&tile, None)]);
    assert_eq!(h.tiles().stats().children_requested, 1);

    assert_eq!(h.run_jobs(), 1);
    let built = tile.slots().children_loader.get();
    assert_eq!(built.as_deref(), Some(&false));
    assert_eq!(h.backend.compiled(), 0);
    assert_eq!(h.terrain.runtime.pending(), 0);

    h.update();
    assert!(!tile.has_children());
}

#[test]
fn test_failed_fetch_merges_nothing_and_is_not_retried() {
    let map = Map::new();
    map.add_image_layer(Arc::new(GradientImageLayer::new("broken", 6).with_failures(1)));
    let mut h = Harness::with_map(map, false);
    let root = h.root();
    let creation_updates = h.backend.descriptor_updates();

    h.frame(&[(&root, None)]);
    assert_eq!(h.run_jobs(), 1);
    assert!(root.slots().data_loader.get().unwrap().is_empty());

    for _ in 0..5 {
        h.frame(&[(&root, None)]);
        h.run_jobs();
    }

    let merged = root.slots().data_merger.get();
    assert_eq!(merged.as_deref(), Some(&true));
    let model = root.render_model();
    assert!(model.color.is_none());
    assert!(model.elevation.is_none());
    assert_eq!(h.backend.descriptor_updates(), creation_updates);

    let stats = h.tiles().stats();
    assert_eq!(stats.loads_requested, 1);
    assert_eq!(stats.merges_requested, 1);
    assert_eq!(h.terrain.scheduler.stats().dispatched, 1);
}

#[test]
fn test_merge_for_released_tile_is_noop() {
    let mut h = Harness::new(false);
    let root = h.root();
    root.slots().data_loader = JobFuture::resolved(TerrainTileModel::default());
    h.frame(&[(&root, None)]);
    assert_eq!(h.terrain.runtime.pending(), 1);

    h.tiles().release_all();
    assert_eq!(h.terrain.runtime.run_update_operations(), 1);
    let merger = root.slots().data_merger.get();
    assert_eq!(merger.as_deref(), Some(&false));
    assert!(root.render_model().color.is_none());
}

#[test]
fn test_terrain_cancel_abandons_outstanding_work() {
    let mut h = Harness::new(false);
    let root = h.root();
    h.frame(&[(&root, None)]);
    assert!(root.slots().data_loader.is_working());

    h.terrain.shutdown();
    assert_eq!(h.run_jobs(), 0);
    assert!(root.slots().data_loader.is_empty());
    assert!(h.tiles().is_empty());
}

#[test]
fn test_priority_prefers_coarse_and_near_tiles() {
    let mut h = Harness::new(false);
    let coarse = h
        .tiles()
        .create_tile(&TileKey::new(1, 0, 0, Profile::GlobalGeodetic), None, &h.terrain)
        .unwrap();
    let fine = h
        .tiles()
        .create_tile(&TileKey::new(3, 0, 0, Profile::GlobalGeodetic), None, &h.terrain)
        .unwrap();
    coarse.set_last_traversal(100.0, 1);
    fine.set_last_traversal(100.0, 1);

    h.tiles().ping(&fine, None);
    h.tiles().ping(&coarse, None);
    h.update();

    assert_eq!(h.terrain.scheduler.pending(), 2);
    h.terrain.scheduler.run_next();
    assert!(coarse.slots().data_loader.is_available());
    assert!(fine.slots().data_loader.is_working());
}
