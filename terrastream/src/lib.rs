//! Terrastream - quadtree terrain tile paging
//!
//! This library pages terrain tiles in and out as a camera moves. Each frame
//! the traversal pings the tiles it visits; the tile registry turns those
//! pings into prioritized background loads, update-thread merges and child
//! subdivision, and evicts tiles that stopped being pinged.
//!
//! # High-Level API
//!
//! Most users only need [`terrain::TerrainNode`]:
//!
//! ```ignore
//! use terrastream::terrain::{Camera, TerrainNode, TerrainSettings};
//!
//! let mut terrain = TerrainNode::new(TerrainSettings::default(), scheduler, runtime);
//! terrain.set_map(map, Profile::GlobalGeodetic)?;
//!
//! loop {
//!     let result = terrain.traverse(&camera, &frame);
//!     terrain.update(&frame);
//!     frame = frame.next();
//! }
//! ```

pub mod config;
pub mod geometry;
pub mod io;
pub mod job;
pub mod key;
pub mod logging;
pub mod map;
pub mod model;
pub mod runtime;
pub mod terrain;
pub mod tile;
pub mod tracker;

/// Version of the terrastream library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
