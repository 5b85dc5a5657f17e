//! Tiling profiles and extents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::TileKey;

/// Half the circumference of the spherical mercator world, in meters.
pub const MERCATOR_HALF_EXTENT: f64 = 20_037_508.342_789_244;

/// Deepest level of detail a key may address.
pub const MAX_LEVEL: u32 = 30;

/// Axis-aligned rectangle in profile units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Center point as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) * 0.5,
            (self.ymin + self.ymax) * 0.5,
        )
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }
}

/// A quadtree tiling scheme over a planar extent.
///
/// Every level doubles the tile count along both axes. Rows are numbered
/// from the top (north) edge of the extent downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Profile {
    /// Plate carrée in degrees, two tiles wide at level 0.
    GlobalGeodetic,
    /// Web mercator in meters, a single tile at level 0.
    SphericalMercator,
}

impl Profile {
    /// Full extent of the profile.
    pub fn extent(&self) -> Extent {
        match self {
            Profile::GlobalGeodetic => Extent::new(-180.0, -90.0, 180.0, 90.0),
            Profile::SphericalMercator => Extent::new(
                -MERCATOR_HALF_EXTENT,
                -MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
                MERCATOR_HALF_EXTENT,
            ),
        }
    }

    /// Tile count at level 0 as `(wide, high)`.
    pub fn root_tiles(&self) -> (u32, u32) {
        match self {
            Profile::GlobalGeodetic => (2, 1),
            Profile::SphericalMercator => (1, 1),
        }
    }

    /// Tile count at the given level as `(wide, high)`.
    pub fn num_tiles(&self, level: u32) -> (u32, u32) {
        let (w, h) = self.root_tiles();
        let factor = 1u32 << level.min(MAX_LEVEL);
        (w * factor, h * factor)
    }

    /// Extent covered by the tile at `(level, x, y)`.
    pub fn tile_extent(&self, level: u32, x: u32, y: u32) -> Extent {
        let full = self.extent();
        let (wide, high) = self.num_tiles(level);
        let tile_w = full.width() / wide as f64;
        let tile_h = full.height() / high as f64;

        let xmin = full.xmin + x as f64 * tile_w;
        let ymax = full.ymax - y as f64 * tile_h;
        Extent::new(xmin, ymax - tile_h, xmin + tile_w, ymax)
    }

    /// All keys at a level, row-major from the top-left tile.
    pub fn all_keys_at_level(&self, level: u32) -> Vec<TileKey> {
        let (wide, high) = self.num_tiles(level);
        let mut keys = Vec::with_capacity((wide * high) as usize);
        for y in 0..high {
            for x in 0..wide {
                keys.push(TileKey::new(level, x, y, *self));
            }
        }
        keys
    }

    /// Key of the tile containing a point, or `None` when outside the extent.
    pub fn key_at(&self, level: u32, x: f64, y: f64) -> Option<TileKey> {
        let full = self.extent();
        if !full.contains(x, y) {
            return None;
        }
        let (wide, high) = self.num_tiles(level);
        let tx = ((x - full.xmin) / full.width() * wide as f64) as u32;
        let ty = ((full.ymax - y) / full.height() * high as f64) as u32;
        Some(TileKey::new(level, tx.min(wide - 1), ty.min(high - 1), *self))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::GlobalGeodetic => "global-geodetic",
            Profile::SphericalMercator => "spherical-mercator",
        }
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::GlobalGeodetic
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a profile name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown profile '{0}' (expected global-geodetic or spherical-mercator)")]
pub struct UnknownProfile(pub String);

impl FromStr for Profile {
    type Err = UnknownProfile;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "global-geodetic" | "geodetic" => Ok(Profile::GlobalGeodetic),
            "spherical-mercator" | "mercator" => Ok(Profile::SphericalMercator),
            other => Err(UnknownProfile(other.to_string())),
        }
    }
}
