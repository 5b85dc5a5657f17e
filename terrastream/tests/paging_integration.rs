//! Integration tests for terrain paging with real worker threads.
//!
//! These tests drive a [`TerrainNode`] the way a renderer would: each frame
//! traverses from a camera and then runs the update pass, while loads run
//! concurrently on scheduler workers. They verify:
//! - Refinement down to the deepest level under a stationary camera
//! - Eviction of tiles the camera has left behind
//! - Split elevation mode reaching the same depth
//! - Reset canceling queued work
//! - Pings from several threads racing the update pass

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use glam::DVec3;
use terrastream::io::IoOptions;
use terrastream::job::{JobScheduler, SchedulerConfig};
use terrastream::key::{Profile, TileKey};
use terrastream::map::{GradientImageLayer, Map, ProceduralElevationLayer};
use terrastream::runtime::{CountingRenderBackend, FrameStamp, Runtime};
use terrastream::terrain::{Camera, TerrainNode, TerrainSettings, TraversalResult};

// =============================================================================
// Test Helpers
// =============================================================================

const MAX_LEVEL: u32 = 5;
const MAX_FRAMES: usize = 2_000;

struct Fixture {
    terrain: TerrainNode,
    scheduler: Arc<JobScheduler>,
    backend: Arc<CountingRenderBackend>,
    frame: FrameStamp,
}

impl Fixture {
    fn new(split: bool, latency: Duration) -> Self {
        let map = Arc::new(Map::new());
        map.add_image_layer(Arc::new(
            GradientImageLayer::new("imagery", MAX_LEVEL)
                .with_size(8)
                .with_latency(latency),
        ));
        map.add_elevation_layer(Arc::new(
            ProceduralElevationLayer::new("elevation", MAX_LEVEL)
                .with_size(5)
                .with_latency(latency),
        ));

        let settings = TerrainSettings {
            tile_size: 5,
            max_level_of_detail: MAX_LEVEL,
            load_elevation_separately: split,
            ..TerrainSettings::default()
        };
        let scheduler = Arc::new(
            JobScheduler::new(SchedulerConfig::default().with_workers(3))
                .expect("Failed to start scheduler"),
        );
        let backend = Arc::new(CountingRenderBackend::default());
        let runtime = Arc::new(Runtime::new(backend.clone()));

        let mut terrain = TerrainNode::new(settings, Arc::clone(&scheduler), runtime);
        terrain.set_map(map, Profile::GlobalGeodetic).unwrap();

        Self {
            terrain,
            scheduler,
            backend,
            frame: FrameStamp::new(1),
        }
    }

    /// One traverse + update pass.
    fn step(&mut self, camera: &Camera) -> TraversalResult {
        let result = self.terrain.traverse(camera, &self.frame);
        self.terrain.update(&self.frame);
        self.frame = self.frame.next();
        result
    }

    /// Steps until `done` holds for a traversal, giving workers time to run.
    fn run_until(
        &mut self,
        camera: &Camera,
        done: impl Fn(&TraversalResult) -> bool,
    ) -> TraversalResult {
        for _ in 0..MAX_FRAMES {
            let result = self.step(camera);
            if done(&result) {
                return result;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!(
            "condition not reached after {} frames; {} jobs pending",
            MAX_FRAMES,
            self.scheduler.pending()
        );
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.terrain.reset();
        self.scheduler.shutdown();
    }
}

fn camera_over(x: f64, y: f64) -> Camera {
    Camera::new(DVec3::new(x, y, 0.05), 400.0)
}

fn deepest(result: &TraversalResult) -> u32 {
    result
        .draw_list
        .iter()
        .map(TileKey::level_of_detail)
        .max()
        .unwrap_or(0)
}

/// No drawn tile may also have an ancestor drawn.
fn assert_no_overlap(result: &TraversalResult) {
    let drawn: HashSet<TileKey> = result.draw_list.iter().copied().collect();
    for key in &result.draw_list {
        for level in 0..key.level_of_detail() {
            let ancestor = key.create_ancestor_key(level).unwrap();
            assert!(
                !drawn.contains(&ancestor),
                "{key} drawn together with ancestor {ancestor}"
            );
        }
    }
}

// =============================================================================
// Refinement
// =============================================================================

#[test]
fn test_stationary_camera_refines_to_max_level() {
    let mut fixture = Fixture::new(false, Duration::ZERO);
    let camera = camera_over(-100.0, 30.0);

    let result = fixture.run_until(&camera, |r| deepest(r) == MAX_LEVEL);
    assert_no_overlap(&result);

    let under_camera = Profile::GlobalGeodetic
        .key_at(MAX_LEVEL, -100.0, 30.0)
        .unwrap();
    assert!(result.draw_list.contains(&under_camera));

    let context = fixture.terrain.context().unwrap();
    let tile = context.tiles.get_tile(&under_camera).unwrap();
    assert!(tile.render_model().color.is_some());
    assert!(tile.render_model().elevation.is_some());
    assert!(fixture.backend.compiled() as usize >= context.tiles.len());
}

#[test]
fn test_split_elevation_refines_to_max_level() {
    let mut fixture = Fixture::new(true, Duration::ZERO);
    let camera = camera_over(45.0, -45.0);

    let result = fixture.run_until(&camera, |r| deepest(r) == MAX_LEVEL);
    assert_no_overlap(&result);

    let context = fixture.terrain.context().unwrap();
    let stats = context.tiles.stats();
    assert!(stats.merges_requested >= 2 * (MAX_LEVEL as u64 + 1));

    let key = Profile::GlobalGeodetic.key_at(MAX_LEVEL, 45.0, -45.0).unwrap();
    let model = context.tiles.get_tile(&key).unwrap().render_model();
    assert!(model.elevation.is_some());
}

// =============================================================================
// Eviction
// =============================================================================

#[test]
fn test_moving_camera_evicts_abandoned_tiles() {
    let mut fixture = Fixture::new(false, Duration::ZERO);

    let first = camera_over(-100.0, 30.0);
    fixture.run_until(&first, |r| deepest(r) == MAX_LEVEL);
    let abandoned = Profile::GlobalGeodetic
        .key_at(MAX_LEVEL, -100.0, 30.0)
        .unwrap();

    let second = camera_over(100.0, -30.0);
    let result = fixture.run_until(&second, |r| deepest(r) == MAX_LEVEL);
    for _ in 0..5 {
        fixture.step(&second);
    }
    assert_no_overlap(&result);

    let context = fixture.terrain.context().unwrap();
    assert!(context.tiles.get_tile(&abandoned).is_none());
    assert!(context.tiles.stats().evicted > 0);
    assert!(fixture.terrain.root_tiles().iter().all(|root| context
        .tiles
        .get_tile(root.key())
        .is_some()));
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_pings_during_update_issue_one_job_per_slot() {
    const PINGERS: usize = 4;
    const FRAMES: u64 = 300;

    let mut fixture = Fixture::new(false, Duration::ZERO);
    fixture.terrain.update(&FrameStamp::new(1));
    let context = Arc::clone(fixture.terrain.context().unwrap());
    let roots = fixture.terrain.root_tiles().to_vec();
    assert_eq!(roots.len(), 2);

    let stop = AtomicBool::new(false);
    let pings = AtomicU64::new(0);
    thread::scope(|scope| {
        for _ in 0..PINGERS {
            scope.spawn(|| {
                while !stop.load(Ordering::Acquire) {
                    for root in &roots {
                        context.tiles.ping(root, None);
                    }
                    pings.fetch_add(1, Ordering::Relaxed);
                    thread::yield_now();
                }
            });
        }

        let io = IoOptions::default();
        for frame_number in 2..2 + FRAMES {
            context.runtime.run_update_operations();
            context
                .tiles
                .update(&FrameStamp::new(frame_number), &io, &context);
            thread::sleep(Duration::from_millis(1));
        }
        stop.store(true, Ordering::Release);
    });

    assert!(pings.load(Ordering::Relaxed) > 0);
    let stats = context.tiles.stats();
    assert_eq!(stats.loads_requested, roots.len() as u64);
    assert_eq!(stats.merges_requested, roots.len() as u64);
    assert_eq!(fixture.scheduler.stats().dispatched, roots.len() as u64);
    for root in &roots {
        let slots = root.slots();
        assert!(slots.data_loader.is_available());
        assert!(slots.data_merger.is_available());
    }
    assert!(roots.iter().all(|root| root.render_model().color.is_some()));
}

// =============================================================================
// Shutdown
// =============================================================================

#[test]
fn test_reset_cancels_queued_work() {
    let mut fixture = Fixture::new(false, Duration::from_millis(20));
    let camera = camera_over(10.0, 10.0);

    for _ in 0..10 {
        fixture.step(&camera);
    }
    let context = Arc::clone(fixture.terrain.context().unwrap());
    assert!(context.tiles.stats().loads_requested > 0);

    fixture.terrain.reset();

    assert!(context.cancel.is_cancelled());
    assert!(context.tiles.is_empty());
    assert_eq!(fixture.scheduler.pending(), 0);
    assert!(fixture.terrain.root_tiles().is_empty());
}
