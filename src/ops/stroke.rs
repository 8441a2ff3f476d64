// ============================================================================
// STROKE RENDERER - round-capped brush / eraser segments on the drawing layer
// ============================================================================

use image::{Rgb, Rgba};

use crate::canvas::{CHUNK_SIZE, PixelBuffer, blend_over};
use crate::components::tools::Tool;

/// Inclusive pixel bounds touched by a draw call: (min_x, min_y, max_x, max_y).
pub type DirtyRect = (u32, u32, u32, u32);

/// How a stroke composites into the drawing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrokeKind {
    /// Source-over with the stroke color.
    Paint,
    /// Destination-out: removes drawing-layer alpha under the stroke.
    Erase,
}

impl StrokeKind {
    /// The stroke kind a tool produces; the bucket does not stroke.
    pub fn for_tool(tool: Tool) -> Option<Self> {
        match tool {
            Tool::Brush => Some(StrokeKind::Paint),
            Tool::Eraser => Some(StrokeKind::Erase),
            Tool::Bucket => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct ActiveStroke {
    kind: StrokeKind,
    color: Rgb<u8>,
    width: f32,
    last: (f32, f32),
}

/// Tracks the stroke in progress between pointer-down and pointer-up.
#[derive(Default)]
pub struct StrokeRenderer {
    active: Option<ActiveStroke>,
}

impl StrokeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Start a stroke at `point` and stamp a round dot there, so a tap without
    /// movement still leaves a mark.
    pub fn begin_stroke(
        &mut self,
        layer: &mut PixelBuffer,
        kind: StrokeKind,
        color: Rgb<u8>,
        point: (f32, f32),
        width: f32,
    ) -> Option<DirtyRect> {
        self.active = Some(ActiveStroke { kind, color, width, last: point });
        draw_segment(layer, point, point, width, kind, color)
    }

    /// Draw the segment from the previous point to `point`.
    /// Returns `None` when no stroke is in progress.
    pub fn extend_stroke(&mut self, layer: &mut PixelBuffer, point: (f32, f32)) -> Option<DirtyRect> {
        let stroke = self.active.as_mut()?;
        let from = std::mem::replace(&mut stroke.last, point);
        let (kind, color, width) = (stroke.kind, stroke.color, stroke.width);
        draw_segment(layer, from, point, width, kind, color)
    }

    /// Finish the current path.  Returns `true` when a stroke was actually in
    /// progress (and a history snapshot is therefore due).
    pub fn end_stroke(&mut self) -> bool {
        self.active.take().is_some()
    }
}

/// Distance from `p` to the segment `a`–`b`.
#[inline]
fn segment_distance(p: (f32, f32), a: (f32, f32), b: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let (apx, apy) = (p.0 - a.0, p.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 1e-12 {
        ((apx * abx + apy * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (dx, dy) = (apx - abx * t, apy - aby * t);
    (dx * dx + dy * dy).sqrt()
}

/// Rasterize one round-capped segment of the given width into `layer`.
/// Coverage is a 1px linear ramp at the capsule edge (anti-aliasing).
pub fn draw_segment(
    layer: &mut PixelBuffer,
    from: (f32, f32),
    to: (f32, f32),
    width: f32,
    kind: StrokeKind,
    color: Rgb<u8>,
) -> Option<DirtyRect> {
    let radius = width * 0.5;
    if radius <= 0.0 || !radius.is_finite() {
        return None;
    }
    let (lw, lh) = (layer.width() as i64, layer.height() as i64);
    let reach = radius + 1.0;
    let min_x = ((from.0.min(to.0) - reach).floor() as i64).max(0);
    let min_y = ((from.1.min(to.1) - reach).floor() as i64).max(0);
    let max_x = ((from.0.max(to.0) + reach).ceil() as i64).min(lw - 1);
    let max_y = ((from.1.max(to.1) + reach).ceil() as i64).min(lh - 1);
    if min_x > max_x || min_y > max_y {
        return None;
    }
    let (min_x, min_y, max_x, max_y) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);

    let Rgb([r, g, b]) = color;
    let cs = CHUNK_SIZE;
    let mut dirty: Option<DirtyRect> = None;

    for chunk_cy in (min_y / cs)..=(max_y / cs) {
        for chunk_cx in (min_x / cs)..=(max_x / cs) {
            let base_x = chunk_cx * cs;
            let base_y = chunk_cy * cs;
            let lx0 = min_x.saturating_sub(base_x);
            let ly0 = min_y.saturating_sub(base_y);
            let lx1 = (max_x + 1 - base_x).min(cs);
            let ly1 = (max_y + 1 - base_y).min(cs);
            if lx0 >= lx1 || ly0 >= ly1 {
                continue;
            }

            // Skip chunks the capsule cannot reach (conservative, via the
            // clipped rect's center and half-diagonal).
            let hw = (lx1 - lx0) as f32 * 0.5;
            let hh = (ly1 - ly0) as f32 * 0.5;
            let center = ((base_x + lx0) as f32 + hw, (base_y + ly0) as f32 + hh);
            if segment_distance(center, from, to) - (hw * hw + hh * hh).sqrt() > radius + 0.5 {
                continue;
            }

            // Erasing an unallocated chunk is a no-op; painting allocates it.
            let chunk = match kind {
                StrokeKind::Paint => layer.chunk_or_insert(chunk_cx, chunk_cy),
                StrokeKind::Erase => match layer.chunk_mut(chunk_cx, chunk_cy) {
                    Some(c) => c,
                    None => continue,
                },
            };

            for ly in ly0..ly1 {
                let gy = base_y + ly;
                for lx in lx0..lx1 {
                    let gx = base_x + lx;
                    let d = segment_distance((gx as f32 + 0.5, gy as f32 + 0.5), from, to);
                    let coverage = (radius + 0.5 - d).clamp(0.0, 1.0);
                    if coverage <= 0.0 {
                        continue;
                    }

                    let old = *chunk.get_pixel(lx, ly);
                    let new = match kind {
                        StrokeKind::Paint => {
                            let a = (coverage * 255.0).round() as u8;
                            blend_over(old, Rgba([r, g, b, a]))
                        }
                        StrokeKind::Erase => {
                            let a = (old[3] as f32 * (1.0 - coverage)).round() as u8;
                            if a == 0 { Rgba([0, 0, 0, 0]) } else { Rgba([old[0], old[1], old[2], a]) }
                        }
                    };
                    chunk.put_pixel(lx, ly, new);

                    dirty = Some(match dirty {
                        Some((x0, y0, x1, y1)) => (x0.min(gx), y0.min(gy), x1.max(gx), y1.max(gy)),
                        None => (gx, gy, gx, gy),
                    });
                }
            }
        }
    }
    dirty
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    #[test]
    fn brush_segment_is_opaque_along_the_path_only() {
        let mut layer = PixelBuffer::new(20, 20);
        let dirty = draw_segment(&mut layer, (5.0, 10.0), (15.0, 10.0), 4.0, StrokeKind::Paint, RED);
        assert!(dirty.is_some());
        assert_eq!(*layer.get_pixel(10, 9), Rgba([255, 0, 0, 255]));
        assert_eq!(*layer.get_pixel(10, 11), Rgba([255, 0, 0, 255]));
        assert_eq!(layer.alpha_at(10, 12), 0);
        assert_eq!(layer.alpha_at(10, 15), 0);
        // Round cap: solid at the endpoint, anti-aliased just past it, then empty.
        assert_eq!(layer.alpha_at(15, 10), 255);
        assert!(layer.alpha_at(16, 10) > 0);
        assert!(layer.alpha_at(16, 10) < 255);
        assert_eq!(layer.alpha_at(18, 10), 0);
    }

    #[test]
    fn eraser_clears_alpha_and_color_under_the_path() {
        let mut layer = PixelBuffer::new(20, 20);
        for y in 0..20 {
            for x in 0..20 {
                layer.put_pixel(x, y, Rgba([0, 128, 0, 255]));
            }
        }
        draw_segment(&mut layer, (5.0, 10.0), (15.0, 10.0), 4.0, StrokeKind::Erase, RED);
        assert_eq!(*layer.get_pixel(10, 10), Rgba([0, 0, 0, 0]));
        assert_eq!(*layer.get_pixel(10, 15), Rgba([0, 128, 0, 255]));
    }

    #[test]
    fn erase_on_empty_layer_allocates_nothing() {
        let mut layer = PixelBuffer::new(100, 100);
        let dirty = draw_segment(&mut layer, (1.0, 1.0), (90.0, 90.0), 10.0, StrokeKind::Erase, RED);
        assert!(dirty.is_none());
        assert_eq!(layer.allocated_chunks().count(), 0);
    }

    #[test]
    fn stroke_lifecycle() {
        let mut layer = PixelBuffer::new(30, 30);
        let mut stroke = StrokeRenderer::new();
        assert!(stroke.extend_stroke(&mut layer, (3.0, 3.0)).is_none());
        assert!(!stroke.end_stroke());

        stroke.begin_stroke(&mut layer, StrokeKind::Paint, RED, (5.0, 5.0), 6.0);
        assert_eq!(layer.alpha_at(5, 5), 255);
        stroke.extend_stroke(&mut layer, (20.0, 5.0));
        assert_eq!(layer.alpha_at(12, 5), 255);
        assert!(stroke.end_stroke());
        assert!(!stroke.is_active());
    }

    #[test]
    fn segment_outside_layer_is_clipped() {
        let mut layer = PixelBuffer::new(10, 10);
        assert!(draw_segment(&mut layer, (-50.0, -50.0), (-40.0, -40.0), 4.0, StrokeKind::Paint, RED).is_none());
        assert_eq!(StrokeKind::for_tool(Tool::Bucket), None);
    }
}
