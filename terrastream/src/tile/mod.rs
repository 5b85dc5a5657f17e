//! Terrain tiles and the registry that pages them.
//!
//! A tile progresses through its slots in a fixed order, each stage gated
//! on the one before it and on its parent:
//!
//! ```text
//!   parent data merged ──► load data ──► merge data ──┐
//!                                                     ├──► load children
//!   parent elev merged ──► load elev ──► merge elev ──┘      (split mode)
//! ```
//!
//! Loads run on the job scheduler; merges run on the update thread through
//! the runtime's update queue.

mod node;
mod registry;
mod selection;

#[cfg(test)]
mod tests;

pub use node::{
    elevation_to_profile_units, BoundingSphere, QuadGroup, SceneNode, TerrainTileNode, TileSlots,
};
pub use registry::{QueueLengths, RegistryStats, TileRegistry};
pub use selection::{LodRange, SelectionInfo};
