//! Distance-based level-of-detail traversal.
//!
//! Stands in for the record pass of a renderer: walks the tile tree from the
//! roots, pings each tile it reaches, and decides per tile whether to draw it
//! or descend into its children.
//!
//! ```text
//!   visit(tile)
//!     ├─ ping
//!     ├─ out of range ─────────────────────► stop
//!     ├─ range < children range, children ─► visit all four
//!     ├─ range < children range, none ─────► needs_children, draw
//!     └─ otherwise ────────────────────────► draw
//! ```
//!
//! A parent visits all four children together, so siblings stay pinged (and
//! resident) as a group even when some are out of range.

use std::sync::Arc;

use glam::DVec3;

use crate::key::TileKey;
use crate::runtime::FrameStamp;
use crate::tile::{BoundingSphere, TerrainTileNode, TileRegistry};

/// Viewer position for a traversal, in profile units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub eye: DVec3,
    /// Tiles farther than this are culled.
    pub max_distance: f64,
}

impl Camera {
    pub fn new(eye: DVec3, max_distance: f64) -> Self {
        Self { eye, max_distance }
    }

    /// Distance from the eye to the surface of `bound`, zero inside it.
    pub fn range_to(&self, bound: &BoundingSphere) -> f64 {
        (self.eye.distance(bound.center) - bound.radius).max(0.0)
    }
}

/// What one traversal saw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraversalResult {
    /// Tiles reached, including culled ones.
    pub visited: usize,
    pub pinged: usize,
    /// Tiles to draw this frame.
    pub draw_list: Vec<TileKey>,
}

pub(crate) fn traverse(
    registry: &TileRegistry,
    roots: &[Arc<TerrainTileNode>],
    camera: &Camera,
    frame: &FrameStamp,
) -> TraversalResult {
    let mut result = TraversalResult::default();
    for root in roots {
        visit(registry, root, None, camera, frame, &mut result);
    }
    result
}

fn visit(
    registry: &TileRegistry,
    tile: &Arc<TerrainTileNode>,
    parent: Option<&TerrainTileNode>,
    camera: &Camera,
    frame: &FrameStamp,
    result: &mut TraversalResult,
) {
    result.visited += 1;
    let range = camera.range_to(&tile.bound());
    tile.set_last_traversal(range as f32, frame.frame_number);

    registry.ping(tile, parent);
    result.pinged += 1;

    if range > camera.max_distance {
        return;
    }

    if (range as f32) < tile.children_visibility_range() {
        if let Some(children) = tile.children() {
            for child in children.iter() {
                visit(registry, child, Some(tile), camera, frame, result);
            }
            return;
        }
        if tile.slots().children_loader.is_empty() {
            tile.set_needs_children(true);
        }
    }

    result.draw_list.push(*tile.key());
}
