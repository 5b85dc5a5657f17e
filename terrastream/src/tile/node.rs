//! Terrain tile node and its per-tile state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use glam::{DVec3, Vec2};
use parking_lot::{Mutex, MutexGuard};

use crate::geometry::SharedGeometry;
use crate::io::IoOptions;
use crate::job::JobFuture;
use crate::key::{Profile, TileKey};
use crate::model::{Heightfield, Image, RenderModel, TerrainTileModel, TextureSlot};
use crate::runtime::FrameStamp;

/// Four children of one tile, in quadrant order.
pub type QuadGroup = [Arc<TerrainTileNode>; 4];

/// Approximate meters per degree, for mixing elevation into geodetic bounds.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Converts meters of elevation into the profile's horizontal units.
pub fn elevation_to_profile_units(profile: Profile, meters: f64) -> f64 {
    match profile {
        Profile::GlobalGeodetic => meters / METERS_PER_DEGREE,
        Profile::SphericalMercator => meters,
    }
}

/// Sphere enclosing a tile, in profile units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: DVec3,
    pub radius: f64,
}

impl Default for BoundingSphere {
    fn default() -> Self {
        Self {
            center: DVec3::ZERO,
            radius: 0.0,
        }
    }
}

/// Asynchronous slots of a tile.
///
/// Each slot holds at most one outstanding request. The registry only
/// issues a request when the slot reads empty.
#[derive(Debug, Default)]
pub struct TileSlots {
    pub elevation_loader: JobFuture<TerrainTileModel>,
    pub elevation_merger: JobFuture<bool>,
    pub data_loader: JobFuture<TerrainTileModel>,
    pub data_merger: JobFuture<bool>,
    pub children_loader: JobFuture<bool>,
}

#[derive(Default)]
struct RenderState {
    model: RenderModel,
    bound: BoundingSphere,
    children: Option<QuadGroup>,
}

/// Capabilities every drawable terrain node provides to the update pass.
pub trait SceneNode {
    /// Per-frame hook for nodes flagged `needs_update`. Returns `true` if
    /// anything changed.
    fn update(&self, frame: &FrameStamp, io: &IoOptions) -> bool;

    /// Recomputes and stores the node's bounding sphere.
    fn recompute_bound(&self) -> BoundingSphere;
}

/// One quadtree tile.
///
/// Shared through `Arc`: the registry holds one reference and, once
/// attached, the parent's child group holds another. Parents are found by
/// key, never through a stored pointer.
pub struct TerrainTileNode {
    key: TileKey,
    geometry: Arc<SharedGeometry>,
    morph_constants: Vec2,
    children_visibility_range: f32,
    slots: Mutex<TileSlots>,
    render: Mutex<RenderState>,
    needs_children: AtomicBool,
    needs_update: AtomicBool,
    do_not_expire: AtomicBool,
    /// `f32` bits.
    last_traversal_range: AtomicU32,
    last_traversal_frame: AtomicU64,
}

impl TerrainTileNode {
    pub(crate) fn new(
        key: TileKey,
        geometry: Arc<SharedGeometry>,
        morph_constants: Vec2,
        children_visibility_range: f32,
    ) -> Self {
        Self {
            key,
            geometry,
            morph_constants,
            children_visibility_range,
            slots: Mutex::new(TileSlots::default()),
            render: Mutex::new(RenderState::default()),
            needs_children: AtomicBool::new(false),
            needs_update: AtomicBool::new(false),
            do_not_expire: AtomicBool::new(false),
            last_traversal_range: AtomicU32::new(f32::MAX.to_bits()),
            last_traversal_frame: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn parent_key(&self) -> Option<TileKey> {
        self.key.create_parent_key()
    }

    pub fn geometry(&self) -> &Arc<SharedGeometry> {
        &self.geometry
    }

    pub fn morph_constants(&self) -> Vec2 {
        self.morph_constants
    }

    /// Camera range below which this tile wants its children. Zero at the
    /// deepest level, so those tiles never subdivide.
    pub fn children_visibility_range(&self) -> f32 {
        self.children_visibility_range
    }

    /// Locks the asynchronous slots.
    pub fn slots(&self) -> MutexGuard<'_, TileSlots> {
        self.slots.lock()
    }

    // -------------------------------------------------------------------------
    // Flags
    // -------------------------------------------------------------------------

    pub fn needs_children(&self) -> bool {
        self.needs_children.load(Ordering::Acquire)
    }

    pub fn set_needs_children(&self, value: bool) {
        self.needs_children.store(value, Ordering::Release);
    }

    pub fn needs_update(&self) -> bool {
        self.needs_update.load(Ordering::Acquire)
    }

    pub fn set_needs_update(&self, value: bool) {
        self.needs_update.store(value, Ordering::Release);
    }

    pub fn do_not_expire(&self) -> bool {
        self.do_not_expire.load(Ordering::Acquire)
    }

    pub fn set_do_not_expire(&self, value: bool) {
        self.do_not_expire.store(value, Ordering::Release);
    }

    /// Camera range recorded by the most recent traversal.
    pub fn last_traversal_range(&self) -> f32 {
        f32::from_bits(self.last_traversal_range.load(Ordering::Relaxed))
    }

    pub fn last_traversal_frame(&self) -> u64 {
        self.last_traversal_frame.load(Ordering::Relaxed)
    }

    pub fn set_last_traversal(&self, range: f32, frame_number: u64) {
        self.last_traversal_range.store(range.to_bits(), Ordering::Relaxed);
        self.last_traversal_frame.store(frame_number, Ordering::Relaxed);
    }

    // -------------------------------------------------------------------------
    // Render state
    // -------------------------------------------------------------------------

    /// Snapshot of the render model.
    pub fn render_model(&self) -> RenderModel {
        self.render.lock().model.clone()
    }

    pub fn bound(&self) -> BoundingSphere {
        self.render.lock().bound
    }

    /// Starts from the parent's textures, narrowed to this tile's quadrant.
    pub fn inherit_from(&self, parent: &TerrainTileNode) {
        let inherited = parent.render_model().inherited(self.key.quadrant());
        self.render.lock().model = inherited;
    }

    pub fn set_color(&self, slot: TextureSlot<Image>) {
        self.render.lock().model.color = Some(slot);
    }

    pub fn set_normal_map(&self, slot: TextureSlot<Image>) {
        self.render.lock().model.normal = Some(slot);
    }

    /// Installs a heightfield. The bound is refreshed by the next `update`.
    pub fn set_elevation(&self, slot: TextureSlot<Heightfield>) {
        self.render.lock().model.elevation = Some(slot);
        self.set_needs_update(true);
    }

    /// Copies the first color layer of `model`. Returns `true` if installed.
    pub fn merge_color(&self, model: &TerrainTileModel) -> bool {
        match model.color_layers.first() {
            Some(layer) => {
                self.set_color(TextureSlot::new(
                    Arc::clone(&layer.image),
                    layer.matrix,
                    layer.source,
                ));
                true
            }
            None => false,
        }
    }

    /// Copies elevation and normal map of `model`. Returns `true` if
    /// anything was installed.
    pub fn merge_elevation(&self, model: &TerrainTileModel) -> bool {
        let mut updated = false;
        if let Some(elevation) = &model.elevation {
            self.set_elevation(TextureSlot::new(
                Arc::clone(&elevation.heightfield),
                elevation.matrix,
                elevation.source,
            ));
            updated = true;
        }
        if let Some(normals) = &model.normal_map {
            self.set_normal_map(TextureSlot::new(
                Arc::clone(&normals.image),
                normals.matrix,
                normals.source,
            ));
            updated = true;
        }
        updated
    }

    // -------------------------------------------------------------------------
    // Children
    // -------------------------------------------------------------------------

    pub fn children(&self) -> Option<QuadGroup> {
        self.render.lock().children.clone()
    }

    pub fn has_children(&self) -> bool {
        self.render.lock().children.is_some()
    }

    /// Links a freshly built child group. Returns `false` if children were
    /// already attached.
    pub fn attach_children(&self, children: QuadGroup) -> bool {
        let mut render = self.render.lock();
        if render.children.is_some() {
            return false;
        }
        render.children = Some(children);
        true
    }

    /// Drops the child group and cancels any child construction, so the
    /// tile may request children again later.
    pub fn unload_children(&self) {
        let children = self.render.lock().children.take();
        self.slots.lock().children_loader.reset();
        drop(children);
    }
}

impl SceneNode for TerrainTileNode {
    fn update(&self, _frame: &FrameStamp, _io: &IoOptions) -> bool {
        if !self.needs_update.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.recompute_bound();
        true
    }

    fn recompute_bound(&self) -> BoundingSphere {
        let mut render = self.render.lock();
        let extent = self.key.extent();
        let (cx, cy) = extent.center();
        let (min_h, max_h) = render.model.elevation_range().unwrap_or((0.0, 0.0));
        let profile = self.key.profile();
        let zmin = elevation_to_profile_units(profile, min_h as f64);
        let zmax = elevation_to_profile_units(profile, max_h as f64);

        let half_w = extent.width() * 0.5;
        let half_h = extent.height() * 0.5;
        let half_z = (zmax - zmin) * 0.5;
        let bound = BoundingSphere {
            center: DVec3::new(cx, cy, (zmin + zmax) * 0.5),
            radius: (half_w * half_w + half_h * half_h + half_z * half_z).sqrt(),
        };
        render.bound = bound;
        bound
    }
}

impl fmt::Debug for TerrainTileNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerrainTileNode")
            .field("key", &self.key)
            .field("needs_children", &self.needs_children())
            .field("needs_update", &self.needs_update())
            .field("do_not_expire", &self.do_not_expire())
            .finish()
    }
}
