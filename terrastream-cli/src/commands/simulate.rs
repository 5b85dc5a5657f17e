//! Simulate command - fly a camera over procedural terrain.
//!
//! Drives a [`TerrainNode`] headlessly: each frame traverses from a camera
//! moving along the profile's horizontal center line, then runs the update
//! pass. Procedural layers stand in for real data sources, with optional
//! latency to exercise cancellation and eviction under load.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Args;
use glam::DVec3;
use terrastream::config::ConfigFile;
use terrastream::job::JobScheduler;
use terrastream::key::{Extent, Profile};
use terrastream::map::{GradientImageLayer, Map, ProceduralElevationLayer};
use terrastream::runtime::{CountingRenderBackend, FrameStamp, Runtime};
use terrastream::terrain::{Camera, TerrainNode};
use tracing::{debug, info};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Frames between progress lines.
const REPORT_INTERVAL: u64 = 60;

/// Arguments for the simulate command.
#[derive(Debug, Clone, Args)]
pub struct SimulateArgs {
    /// Number of frames to run
    #[arg(long, default_value_t = 600)]
    pub frames: u64,

    /// Target frame rate (0 = run unthrottled)
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Worker threads (overrides [scheduler] workers, 0 = single thread)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Load elevation as a separate request from imagery
    #[arg(long)]
    pub split_elevation: bool,

    /// Deepest level of detail (overrides [terrain] max_level_of_detail)
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Simulated fetch latency per layer request, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Camera height as a fraction of the profile width
    #[arg(long, default_value_t = 0.002)]
    pub altitude: f64,

    /// Camera movement per frame as a fraction of the profile width
    #[arg(long, default_value_t = 0.0005)]
    pub speed: f64,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            frames: 600,
            fps: 60,
            workers: None,
            split_elevation: false,
            max_level: None,
            latency_ms: 0,
            altitude: 0.002,
            speed: 0.0005,
        }
    }
}

/// What one simulated frame produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub drawn: usize,
    /// Deepest level among drawn tiles.
    pub deepest: u32,
    pub tiles: usize,
    pub changed: bool,
}

/// Totals over a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationSummary {
    pub frames: u64,
    pub peak_tiles: usize,
    pub deepest: u32,
    pub loads_requested: u64,
    pub merges_requested: u64,
    pub evicted: u64,
    pub jobs_completed: u64,
    pub jobs_canceled: u64,
    pub compiled: u64,
}

/// A terrain engine plus the camera path driving it.
pub struct Simulation {
    terrain: TerrainNode,
    scheduler: Arc<JobScheduler>,
    backend: Arc<CountingRenderBackend>,
    extent: Extent,
    altitude: f64,
    speed: f64,
    frame: FrameStamp,
    started: Instant,
    summary: SimulationSummary,
}

impl Simulation {
    /// Builds the engine from the config file with command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns [`CliError::Scheduler`] if worker threads cannot be spawned
    /// and [`CliError::Terrain`] if the resulting settings are invalid.
    pub fn new(config: &ConfigFile, args: &SimulateArgs) -> Result<Self, CliError> {
        let mut settings = config.terrain.clone();
        if args.split_elevation {
            settings.load_elevation_separately = true;
        }
        if let Some(level) = args.max_level {
            settings.max_level_of_detail = level;
        }

        let mut scheduler_config = config.scheduler.clone();
        if let Some(workers) = args.workers {
            scheduler_config.workers = workers;
        }
        let scheduler = Arc::new(JobScheduler::new(scheduler_config).map_err(CliError::Scheduler)?);
        let backend = Arc::new(CountingRenderBackend::default());
        let runtime = Arc::new(Runtime::new(backend.clone()));

        let latency = Duration::from_millis(args.latency_ms);
        let max_level = settings.max_level_of_detail;
        let map = Arc::new(Map::new());
        map.add_image_layer(Arc::new(
            GradientImageLayer::new("imagery", max_level).with_latency(latency),
        ));
        map.add_elevation_layer(Arc::new(
            ProceduralElevationLayer::new("elevation", max_level).with_latency(latency),
        ));

        let mut terrain = TerrainNode::new(settings, Arc::clone(&scheduler), runtime);
        terrain.set_map(map, config.profile)?;

        Ok(Self {
            terrain,
            scheduler,
            backend,
            extent: config.profile.extent(),
            altitude: args.altitude,
            speed: args.speed,
            frame: FrameStamp::new(1),
            started: Instant::now(),
            summary: SimulationSummary::default(),
        })
    }

    pub fn profile(&self) -> Option<Profile> {
        self.terrain.context().map(|context| context.profile)
    }

    /// Camera for `frame`, wrapping around the profile's x range.
    pub fn camera_at(&self, frame: u64) -> Camera {
        let width = self.extent.width();
        let (_, cy) = self.extent.center();
        let travelled = (frame as f64 * self.speed * width).rem_euclid(width);
        let eye = DVec3::new(self.extent.xmin + travelled, cy, self.altitude * width);
        Camera::new(eye, width * 0.5)
    }

    /// Runs one frame: traverse, update, then drain jobs in single-thread mode.
    pub fn step(&mut self) -> FrameReport {
        let frame = self.frame.with_time(self.started.elapsed().as_secs_f64());
        let camera = self.camera_at(frame.frame_number);

        let traversal = self.terrain.traverse(&camera, &frame);
        let changed = self.terrain.update(&frame);
        if self.scheduler.config().is_manual() {
            self.scheduler.run_pending();
        }

        let tiles = self
            .terrain
            .context()
            .map_or(0, |context| context.tiles.len());
        let deepest = traversal
            .draw_list
            .iter()
            .map(|key| key.level_of_detail())
            .max()
            .unwrap_or(0);

        self.summary.frames += 1;
        self.summary.peak_tiles = self.summary.peak_tiles.max(tiles);
        self.summary.deepest = self.summary.deepest.max(deepest);
        self.frame = self.frame.next();

        FrameReport {
            frame: frame.frame_number,
            drawn: traversal.draw_list.len(),
            deepest,
            tiles,
            changed,
        }
    }

    /// Stops the engine and collects totals.
    pub fn finish(mut self) -> SimulationSummary {
        if let Some(context) = self.terrain.context() {
            let stats = context.tiles.stats();
            self.summary.loads_requested = stats.loads_requested;
            self.summary.merges_requested = stats.merges_requested;
            self.summary.evicted = stats.evicted;
        }
        self.terrain.reset();
        self.scheduler.shutdown();

        let jobs = self.scheduler.stats();
        self.summary.jobs_completed = jobs.completed;
        self.summary.jobs_canceled = jobs.canceled;
        self.summary.compiled = self.backend.compiled();
        self.summary
    }
}

/// Run the simulate command.
pub async fn run(args: SimulateArgs, runner: &CliRunner) -> Result<(), CliError> {
    runner.log_startup("simulate");
    let mut simulation = Simulation::new(runner.config(), &args)?;

    info!(
        frames = args.frames,
        fps = args.fps,
        split_elevation = args.split_elevation || runner.config().terrain.load_elevation_separately,
        latency_ms = args.latency_ms,
        "Starting simulation"
    );
    println!("Simulating {} frames (Ctrl-C to stop)...", args.frames);

    let mut ticker = (args.fps > 0).then(|| {
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / args.fps as f64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval
    });
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    for _ in 0..args.frames {
        match ticker.as_mut() {
            Some(ticker) => {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = &mut ctrl_c => {
                        info!("Interrupted, stopping simulation");
                        break;
                    }
                }
            }
            None => tokio::task::yield_now().await,
        }

        let report = simulation.step();
        debug!(
            frame = report.frame,
            drawn = report.drawn,
            deepest = report.deepest,
            tiles = report.tiles,
            changed = report.changed,
            "Frame"
        );
        if report.frame % REPORT_INTERVAL == 0 {
            println!(
                "  frame {:>6}: {:>4} drawn, level {:>2}, {:>5} tiles resident",
                report.frame, report.drawn, report.deepest, report.tiles
            );
        }
    }

    let profile = simulation.profile();
    let summary = simulation.finish();
    info!(?summary, "Simulation finished");

    println!();
    println!("Simulation Summary");
    println!("==================");
    if let Some(profile) = profile {
        println!("  Profile:          {}", profile);
    }
    println!("  Frames:           {}", summary.frames);
    println!("  Peak tiles:       {}", summary.peak_tiles);
    println!("  Deepest level:    {}", summary.deepest);
    println!("  Loads requested:  {}", summary.loads_requested);
    println!("  Merges requested: {}", summary.merges_requested);
    println!("  Tiles evicted:    {}", summary.evicted);
    println!("  Tiles compiled:   {}", summary.compiled);
    println!(
        "  Jobs:             {} completed, {} canceled",
        summary.jobs_completed, summary.jobs_canceled
    );

    Ok(())
}
