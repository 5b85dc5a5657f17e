//! Synthetic layers for headless runs and tests.
//!
//! Both layers derive their output purely from the tile extent, so the same
//! key always yields the same data. An optional latency simulates a slow
//! source; it sleeps in short steps and gives up early on cancellation.

use std::f64::consts::TAU;
use std::thread;
use std::time::Duration;

use super::layer::{ElevationLayer, ImageLayer, LayerError, TileLayer};
use crate::io::IoOptions;
use crate::key::TileKey;
use crate::model::{Heightfield, Image};

/// Default samples per heightfield edge.
pub const DEFAULT_HEIGHTFIELD_SIZE: u32 = 17;

/// Default image edge in pixels.
pub const DEFAULT_IMAGE_SIZE: u32 = 64;

const LATENCY_STEP: Duration = Duration::from_millis(2);

/// Sleeps for `latency` unless cancelled first. Returns `false` if cancelled.
fn simulate_latency(latency: Duration, io: &IoOptions) -> bool {
    let mut remaining = latency;
    while !remaining.is_zero() {
        if io.is_cancelled() {
            return false;
        }
        let step = remaining.min(LATENCY_STEP);
        thread::sleep(step);
        remaining -= step;
    }
    !io.is_cancelled()
}

/// Elevation from a sum of sine waves over the profile plane.
#[derive(Debug, Clone)]
pub struct ProceduralElevationLayer {
    name: String,
    max_level: u32,
    size: u32,
    amplitude: f32,
    /// Wavelength as a fraction of the profile width.
    wavelength: f64,
    latency: Duration,
}

impl ProceduralElevationLayer {
    pub fn new(name: impl Into<String>, max_level: u32) -> Self {
        Self {
            name: name.into(),
            max_level,
            size: DEFAULT_HEIGHTFIELD_SIZE,
            amplitude: 4_000.0,
            wavelength: 0.125,
            latency: Duration::ZERO,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.max(2);
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Elevation at a point in profile units.
    pub fn sample(&self, key: &TileKey, x: f64, y: f64) -> f32 {
        let full = key.profile().extent();
        let wl = full.width() * self.wavelength;
        let u = (x - full.xmin) / wl;
        let v = (y - full.ymin) / wl;
        let h = (u * TAU).sin() * (v * TAU).cos() * 0.5 + (u * TAU * 4.0).sin() * 0.1;
        (h as f32 * 0.5 + 0.5) * self.amplitude
    }
}

impl TileLayer for ProceduralElevationLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_level(&self) -> u32 {
        self.max_level
    }
}

impl ElevationLayer for ProceduralElevationLayer {
    fn create_heightfield(
        &self,
        key: &TileKey,
        io: &IoOptions,
    ) -> Result<Option<Heightfield>, LayerError> {
        if !self.supports_level(key.level_of_detail()) {
            return Ok(None);
        }
        if !simulate_latency(self.latency, io) {
            return Ok(None);
        }

        let extent = key.extent();
        let step_x = extent.width() / (self.size - 1) as f64;
        let step_y = extent.height() / (self.size - 1) as f64;
        Ok(Some(Heightfield::from_fn(self.size, self.size, |col, row| {
            self.sample(
                key,
                extent.xmin + col as f64 * step_x,
                extent.ymax - row as f64 * step_y,
            )
        })))
    }
}

/// Imagery colored by position, with the level of detail in the blue channel.
///
/// Can be told to fail for a deterministic subset of keys to exercise the
/// transient failure path.
#[derive(Debug, Clone)]
pub struct GradientImageLayer {
    name: String,
    max_level: u32,
    size: u32,
    latency: Duration,
    fail_every: Option<u32>,
}

impl GradientImageLayer {
    pub fn new(name: impl Into<String>, max_level: u32) -> Self {
        Self {
            name: name.into(),
            max_level,
            size: DEFAULT_IMAGE_SIZE,
            latency: Duration::ZERO,
            fail_every: None,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size.max(1);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail roughly one in `n` keys (`n == 0` disables failures).
    pub fn with_failures(mut self, n: u32) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    fn should_fail(&self, key: &TileKey) -> bool {
        match self.fail_every {
            Some(n) => (key.tile_x() + key.tile_y() + key.level_of_detail()) % n == 0,
            None => false,
        }
    }
}

impl TileLayer for GradientImageLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn max_level(&self) -> u32 {
        self.max_level
    }
}

impl ImageLayer for GradientImageLayer {
    fn create_image(&self, key: &TileKey, io: &IoOptions) -> Result<Option<Image>, LayerError> {
        if !self.supports_level(key.level_of_detail()) {
            return Ok(None);
        }
        if !simulate_latency(self.latency, io) {
            return Ok(None);
        }
        if self.should_fail(key) {
            return Err(LayerError::Failed {
                layer: self.name.clone(),
                key: *key,
                reason: "simulated outage".to_string(),
            });
        }

        let full = key.profile().extent();
        let extent = key.extent();
        let blue = (key.level_of_detail() * 16).min(255) as u8;
        let size = self.size;
        Ok(Some(Image::from_fn(size, size, |px, py| {
            let x = extent.xmin + (px as f64 + 0.5) / size as f64 * extent.width();
            let y = extent.ymax - (py as f64 + 0.5) / size as f64 * extent.height();
            let r = ((x - full.xmin) / full.width() * 255.0) as u8;
            let g = ((y - full.ymin) / full.height() * 255.0) as u8;
            image::Rgba([r, g, blue, 255])
        })))
    }
}
