// ============================================================================
// FLOOD FILL - bucket tool region growing on the drawing layer
// ============================================================================
//
// The fill only ever writes into the drawing layer, but it is bounded by the
// background's boundary mask: line art stops the fill even though the fill
// never touches the line art itself.

use image::{Rgb, Rgba};

use crate::canvas::PixelBuffer;

/// Default drawing-layer alpha below which a pixel still counts as unpainted.
/// Tolerates faint anti-aliased stroke edges.
pub const DEFAULT_FILL_TOLERANCE: u8 = 10;

/// Maps canvas-space coordinates into the background's native coordinate space
/// (`scale_x = image_w / canvas_w`, `scale_y = image_h / canvas_h`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SourceMapping {
    pub scale_x: f32,
    pub scale_y: f32,
    source_w: u32,
    source_h: u32,
}

impl SourceMapping {
    pub fn new(source_w: u32, source_h: u32, canvas_w: u32, canvas_h: u32) -> Self {
        Self {
            scale_x: source_w as f32 / canvas_w.max(1) as f32,
            scale_y: source_h as f32 / canvas_h.max(1) as f32,
            source_w: source_w.max(1),
            source_h: source_h.max(1),
        }
    }

    #[inline]
    pub fn to_source(&self, x: u32, y: u32) -> (u32, u32) {
        let sx = (x as f32 * self.scale_x) as u32;
        let sy = (y as f32 * self.scale_y) as u32;
        (sx.min(self.source_w - 1), sy.min(self.source_h - 1))
    }
}

/// The set of canvas pixels a fill will recolor, plus the color to use.
#[derive(Clone, Debug)]
pub struct FillRegion {
    color: Rgb<u8>,
    width: u32,
    /// Packed `y * width + x` indices, in visit order.
    indices: Vec<u32>,
    bbox: Option<(u32, u32, u32, u32)>,
}

impl FillRegion {
    fn empty(color: Rgb<u8>, width: u32) -> Self {
        Self { color, width, indices: Vec::new(), bbox: None }
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// (min_x, min_y, max_x, max_y), inclusive.  `None` when nothing is filled.
    pub fn bbox(&self) -> Option<(u32, u32, u32, u32)> {
        self.bbox
    }

    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let w = self.width;
        self.indices.iter().map(move |&i| (i % w, i / w))
    }

    /// Write the whole region into the layer at full opacity in one pass.
    pub fn commit(&self, layer: &mut PixelBuffer) {
        let Rgb([r, g, b]) = self.color;
        let px = Rgba([r, g, b, 255]);
        for (x, y) in self.pixels() {
            layer.put_pixel(x, y, px);
        }
    }
}

/// 4-connected flood fill driven by an explicit stack.  The visited mask is
/// kept between calls to avoid reallocating it, and reset at the start of
/// every fill.
pub struct FloodFill {
    width: u32,
    height: u32,
    tolerance: u8,
    visited: Vec<u8>,
    /// Packed `y * width + x` pixel indices still to visit.
    stack: Vec<u32>,
}

impl FloodFill {
    pub fn new(width: u32, height: u32, tolerance: u8) -> Self {
        Self {
            width,
            height,
            tolerance,
            visited: Vec::new(),
            stack: Vec::with_capacity(4096),
        }
    }

    /// Track a new surface size.  The mask is reallocated on the next fill.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn set_tolerance(&mut self, tolerance: u8) {
        self.tolerance = tolerance;
    }

    #[inline]
    fn is_unpainted(&self, alpha: u8) -> bool {
        alpha == 0 || alpha < self.tolerance
    }

    /// Compute the region reachable from `seed`.
    ///
    /// A pixel is fillable when its background boundary alpha is 0 and its
    /// drawing-layer alpha is below the tolerance.  A seed on opaque line art
    /// yields an empty region.  In-bounds neighbors are pushed unchecked and
    /// tested when popped.
    pub fn fill<B, D>(
        &mut self,
        seed: (u32, u32),
        color: Rgb<u8>,
        background_alpha_at: B,
        drawing_alpha_at: D,
    ) -> FillRegion
    where
        B: Fn(u32, u32) -> u8,
        D: Fn(u32, u32) -> u8,
    {
        let (w, h) = (self.width, self.height);
        let mut region = FillRegion::empty(color, w);
        if seed.0 >= w || seed.1 >= h {
            return region;
        }
        if background_alpha_at(seed.0, seed.1) != 0 {
            return region;
        }

        let area = w as usize * h as usize;
        if self.visited.len() != area {
            self.visited = vec![0u8; area];
        } else {
            self.visited.fill(0);
        }
        self.stack.clear();
        self.stack.push(seed.1 * w + seed.0);

        let (mut min_x, mut min_y, mut max_x, mut max_y) = (seed.0, seed.1, seed.0, seed.1);

        while let Some(idx) = self.stack.pop() {
            if self.visited[idx as usize] != 0 {
                continue;
            }
            self.visited[idx as usize] = 1;

            let (x, y) = (idx % w, idx / w);
            if background_alpha_at(x, y) != 0 || !self.is_unpainted(drawing_alpha_at(x, y)) {
                continue;
            }

            region.indices.push(idx);
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);

            if x > 0 {
                self.stack.push(idx - 1);
            }
            if x + 1 < w {
                self.stack.push(idx + 1);
            }
            if y > 0 {
                self.stack.push(idx - w);
            }
            if y + 1 < h {
                self.stack.push(idx + w);
            }
        }

        if !region.indices.is_empty() {
            region.bbox = Some((min_x, min_y, max_x, max_y));
        }
        region
    }
}
