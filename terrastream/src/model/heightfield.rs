//! Regular grid of elevation samples.

/// Row-major grid of heights in meters, row 0 at the northern edge.
#[derive(Debug, Clone, PartialEq)]
pub struct Heightfield {
    width: u32,
    height: u32,
    heights: Vec<f32>,
}

impl Heightfield {
    /// Flat heightfield at sea level.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            heights: vec![0.0; (width * height) as usize],
        }
    }

    /// Builds a heightfield by sampling `f(col, row)`.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> f32) -> Self {
        let mut heights = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                heights.push(f(col, row));
            }
        }
        Self {
            width,
            height,
            heights,
        }
    }

    /// Wraps existing samples. `None` if the length does not match.
    pub fn from_vec(width: u32, height: u32, heights: Vec<f32>) -> Option<Self> {
        (heights.len() == (width * height) as usize).then_some(Self {
            width,
            height,
            heights,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    #[inline]
    pub fn get(&self, col: u32, row: u32) -> f32 {
        self.heights[(row * self.width + col) as usize]
    }

    /// Bilinear sample at normalized `(u, v)`, clamped to the grid.
    pub fn height_at(&self, u: f32, v: f32) -> f32 {
        if self.width == 0 || self.height == 0 {
            return 0.0;
        }
        let x = u.clamp(0.0, 1.0) * (self.width - 1) as f32;
        let y = v.clamp(0.0, 1.0) * (self.height - 1) as f32;
        let c0 = x.floor() as u32;
        let r0 = y.floor() as u32;
        let c1 = (c0 + 1).min(self.width - 1);
        let r1 = (r0 + 1).min(self.height - 1);
        let fx = x - c0 as f32;
        let fy = y - r0 as f32;

        let top = self.get(c0, r0) * (1.0 - fx) + self.get(c1, r0) * fx;
        let bottom = self.get(c0, r1) * (1.0 - fx) + self.get(c1, r1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Minimum and maximum height.
    pub fn min_max(&self) -> (f32, f32) {
        self.min_max_in(0.0, 0.0, 1.0, 1.0)
    }

    /// Minimum and maximum of the samples inside the normalized window.
    pub fn min_max_in(&self, u0: f32, v0: f32, u1: f32, v1: f32) -> (f32, f32) {
        if self.heights.is_empty() {
            return (0.0, 0.0);
        }
        let to_col = |u: f32| (u.clamp(0.0, 1.0) * (self.width - 1) as f32).round() as u32;
        let to_row = |v: f32| (v.clamp(0.0, 1.0) * (self.height - 1) as f32).round() as u32;
        let (c0, c1) = (to_col(u0.min(u1)), to_col(u0.max(u1)));
        let (r0, r1) = (to_row(v0.min(v1)), to_row(v0.max(v1)));

        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for row in r0..=r1 {
            for col in c0..=c1 {
                let h = self.get(col, row);
                min = min.min(h);
                max = max.max(h);
            }
        }
        (min, max)
    }
}
