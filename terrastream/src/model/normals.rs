//! Normal map generation from heightfields.

use glam::Vec3;

use super::{Heightfield, Image};
use crate::key::{Extent, Profile};

/// Approximate meters per degree at the equator.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Encodes surface normals of `heightfield` over `extent` into an RGBA image.
///
/// Normals are packed as `(n * 0.5 + 0.5) * 255` with x east, y north and z
/// up; alpha is opaque.
pub fn create_normal_map(heightfield: &Heightfield, extent: &Extent, profile: Profile) -> Image {
    let (w, h) = (heightfield.width(), heightfield.height());
    let mut image = Image::new(w, h);
    if w < 2 || h < 2 {
        return image;
    }

    let units_to_meters = match profile {
        Profile::GlobalGeodetic => {
            let (_, lat) = extent.center();
            METERS_PER_DEGREE * lat.to_radians().cos().max(0.01)
        }
        Profile::SphericalMercator => 1.0,
    };
    let dx = (extent.width() / (w - 1) as f64 * units_to_meters) as f32;
    let dy = (extent.height() / (h - 1) as f64 * units_to_meters) as f32;

    for row in 0..h {
        for col in 0..w {
            let left = heightfield.get(col.saturating_sub(1), row);
            let right = heightfield.get((col + 1).min(w - 1), row);
            let up = heightfield.get(col, row.saturating_sub(1));
            let down = heightfield.get(col, (row + 1).min(h - 1));

            let span_x = dx * (((col + 1).min(w - 1) - col.saturating_sub(1)) as f32);
            let span_y = dy * (((row + 1).min(h - 1) - row.saturating_sub(1)) as f32);
            // Rows run southward, so north is up - down.
            let normal =
                Vec3::new(-(right - left) / span_x, -(up - down) / span_y, 1.0).normalize();

            let encode = |c: f32| ((c * 0.5 + 0.5) * 255.0).round() as u8;
            image.put_pixel(
                col,
                row,
                image::Rgba([encode(normal.x), encode(normal.y), encode(normal.z), 255]),
            );
        }
    }
    image
}
