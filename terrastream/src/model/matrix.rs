//! Texture scale/bias matrices.
//!
//! Texture coordinates run `u` west→east and `v` north→south, matching tile
//! rows. A scale/bias matrix maps a tile's `[0,1]²` into the sub-rectangle of
//! a coarser source image.

use glam::{Mat4, Vec4};

use crate::key::TileKey;

fn from_scale_bias(scale: f32, bias_u: f32, bias_v: f32) -> Mat4 {
    Mat4::from_cols(
        Vec4::new(scale, 0.0, 0.0, 0.0),
        Vec4::new(0.0, scale, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 1.0, 0.0),
        Vec4::new(bias_u, bias_v, 0.0, 1.0),
    )
}

/// Matrix mapping `key`'s texture space into `ancestor`'s.
///
/// Returns identity when the keys are equal. `ancestor` must contain `key`.
pub fn scale_bias(key: &TileKey, ancestor: &TileKey) -> Mat4 {
    let depth = key.level_of_detail().saturating_sub(ancestor.level_of_detail());
    if depth == 0 {
        return Mat4::IDENTITY;
    }
    let n = (1u64 << depth) as f64;
    let scale = 1.0 / n;
    let bias_u = (key.tile_x() as f64 - ancestor.tile_x() as f64 * n) * scale;
    let bias_v = (key.tile_y() as f64 - ancestor.tile_y() as f64 * n) * scale;
    from_scale_bias(scale as f32, bias_u as f32, bias_v as f32)
}

/// Matrix mapping a child quadrant into its parent's texture space.
pub fn quadrant_scale_bias(quadrant: u32) -> Mat4 {
    let bias_u = (quadrant & 1) as f32 * 0.5;
    let bias_v = (quadrant >> 1) as f32 * 0.5;
    from_scale_bias(0.5, bias_u, bias_v)
}

/// Applies `matrix` to a texture coordinate.
pub fn transform_uv(matrix: &Mat4, u: f32, v: f32) -> (f32, f32) {
    let out = *matrix * Vec4::new(u, v, 0.0, 1.0);
    (out.x, out.y)
}
