//! Tile mesh construction.

use glam::{Vec2, Vec3};

use super::GeometrySettings;

/// Grid mesh in tile-local unit space shared by many tiles.
///
/// Positions are `(u, v, drop)`: `u` and `v` span `[0, 1]` with `v` running
/// southward, and `drop` is zero on the surface and `-skirt_ratio` on skirt
/// vertices. The renderer scales and displaces them per tile.
#[derive(Debug, Clone)]
pub struct SharedGeometry {
    settings: GeometrySettings,
    positions: Vec<Vec3>,
    tex_coords: Vec<Vec2>,
    /// Per-vertex morph target on the next coarser grid; empty unless morphing.
    neighbors: Vec<Vec2>,
    indices: Vec<u32>,
}

impl SharedGeometry {
    pub(super) fn build(settings: &GeometrySettings) -> Self {
        let size = settings.tile_size.max(2);
        let step = 1.0 / (size - 1) as f32;
        let surface_count = (size * size) as usize;

        let mut positions = Vec::with_capacity(surface_count);
        let mut tex_coords = Vec::with_capacity(surface_count);
        for row in 0..size {
            for col in 0..size {
                let uv = Vec2::new(col as f32 * step, row as f32 * step);
                positions.push(uv.extend(0.0));
                tex_coords.push(uv);
            }
        }

        let mut indices = Vec::with_capacity(((size - 1) * (size - 1) * 6) as usize);
        for row in 0..size - 1 {
            for col in 0..size - 1 {
                let i = row * size + col;
                indices.extend_from_slice(&[i, i + size, i + 1, i + 1, i + size, i + size + 1]);
            }
        }

        let neighbors = if settings.morph_terrain {
            let coarse = |i: u32| -> f32 {
                if i % 2 == 0 {
                    i as f32 * step
                } else {
                    // Midpoint of the two even neighbors.
                    ((i - 1) as f32 * step + ((i + 1).min(size - 1)) as f32 * step) * 0.5
                }
            };
            (0..size)
                .flat_map(|row| (0..size).map(move |col| (col, row)))
                .map(|(col, row)| Vec2::new(coarse(col), coarse(row)))
                .collect()
        } else {
            Vec::new()
        };

        let mut geometry = Self {
            settings: settings.clone(),
            positions,
            tex_coords,
            neighbors,
            indices,
        };
        if settings.skirt_ratio > 0.0 {
            geometry.add_skirt(size);
        }
        geometry
    }

    /// Appends a ring of dropped vertices around the border, stitched to the
    /// edge with one quad per border segment.
    fn add_skirt(&mut self, size: u32) {
        let mut border = Vec::with_capacity((4 * (size - 1)) as usize);
        for col in 0..size - 1 {
            border.push(col);
        }
        for row in 0..size - 1 {
            border.push(row * size + size - 1);
        }
        for col in (1..size).rev() {
            border.push((size - 1) * size + col);
        }
        for row in (1..size).rev() {
            border.push(row * size);
        }

        let first_skirt = self.positions.len() as u32;
        for &surface in &border {
            let p = self.positions[surface as usize];
            self.positions.push(Vec3::new(p.x, p.y, -self.settings.skirt_ratio));
            self.tex_coords.push(self.tex_coords[surface as usize]);
            if !self.neighbors.is_empty() {
                self.neighbors.push(self.neighbors[surface as usize]);
            }
        }

        let ring = border.len() as u32;
        for i in 0..ring {
            let next = (i + 1) % ring;
            let (a, b) = (border[i as usize], border[next as usize]);
            let (sa, sb) = (first_skirt + i, first_skirt + next);
            self.indices.extend_from_slice(&[a, sa, b, b, sa, sb]);
        }
    }

    pub fn settings(&self) -> &GeometrySettings {
        &self.settings
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn tex_coords(&self) -> &[Vec2] {
        &self.tex_coords
    }

    pub fn neighbors(&self) -> &[Vec2] {
        &self.neighbors
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}
