//! Quadtree tile addressing.
//!
//! A [`TileKey`] names one cell of a [`Profile`]'s quadtree. Parent and
//! child keys are derived arithmetically, so relationships between tiles
//! never need pointers:
//!
//! ```text
//!            level n          (x, y)
//!                ┌──────┬──────┐
//!  level n+1     │  0   │  1   │   0 = (2x,   2y)     1 = (2x+1, 2y)
//!                ├──────┼──────┤
//!                │  2   │  3   │   2 = (2x,   2y+1)   3 = (2x+1, 2y+1)
//!                └──────┴──────┘
//! ```

mod profile;


pub use profile::{Extent, Profile, UnknownProfile, MAX_LEVEL, MERCATOR_HALF_EXTENT};

use std::fmt;

/// Identifies one quadtree cell.
///
/// Keys order by `(level, x, y)`, with the profile breaking any remaining tie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    level: u32,
    x: u32,
    y: u32,
    profile: Profile,
}

impl TileKey {
    /// Creates a key.
    ///
    /// # Arguments
    ///
    /// * `level` - Level of detail, 0 is the coarsest
    /// * `x` - Column, 0 at the western edge
    /// * `y` - Row, 0 at the northern edge
    /// * `profile` - Tiling scheme the key belongs to
    pub const fn new(level: u32, x: u32, y: u32, profile: Profile) -> Self {
        Self {
            level,
            x,
            y,
            profile,
        }
    }

    #[inline]
    pub fn level_of_detail(&self) -> u32 {
        self.level
    }

    #[inline]
    pub fn tile_x(&self) -> u32 {
        self.x
    }

    #[inline]
    pub fn tile_y(&self) -> u32 {
        self.y
    }

    #[inline]
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// True when the key addresses a cell inside its profile.
    pub fn is_valid(&self) -> bool {
        if self.level > MAX_LEVEL {
            return false;
        }
        let (wide, high) = self.profile.num_tiles(self.level);
        self.x < wide && self.y < high
    }

    /// Which child of its parent this key is (0..=3), see the module diagram.
    #[inline]
    pub fn quadrant(&self) -> u32 {
        (self.x & 1) | ((self.y & 1) << 1)
    }

    /// Key of one of the four children.
    ///
    /// # Panics
    ///
    /// Panics if `quadrant` is not in `0..4`.
    pub fn create_child_key(&self, quadrant: u32) -> TileKey {
        assert!(quadrant < 4, "quadrant out of range: {quadrant}");
        TileKey {
            level: self.level + 1,
            x: self.x * 2 + (quadrant & 1),
            y: self.y * 2 + (quadrant >> 1),
            profile: self.profile,
        }
    }

    /// Key of the parent cell. `None` only at level 0.
    pub fn create_parent_key(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }
        Some(TileKey {
            level: self.level - 1,
            x: self.x >> 1,
            y: self.y >> 1,
            profile: self.profile,
        })
    }

    /// Key of the ancestor at `level`, or `None` if `level` is deeper than this key.
    pub fn create_ancestor_key(&self, level: u32) -> Option<TileKey> {
        if level > self.level {
            return None;
        }
        let shift = self.level - level;
        Some(TileKey {
            level,
            x: self.x >> shift,
            y: self.y >> shift,
            profile: self.profile,
        })
    }

    /// Extent of the cell in profile units.
    pub fn extent(&self) -> Extent {
        self.profile.tile_extent(self.level, self.x, self.y)
    }

    /// Compact `level/x/y` form used in logs and job names.
    pub fn str(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}
