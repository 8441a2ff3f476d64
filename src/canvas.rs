use std::sync::Arc;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use rayon::prelude::*;

use crate::ops::fill::SourceMapping;
use crate::ops::transform::{self, ViewTransform};

// ============================================================================
// PIXEL BUFFER – sparse 64×64 chunk storage backing the drawing layer
// ============================================================================

pub const CHUNK_SIZE: u32 = 64;

/// A pixel with zero alpha, returned by reference for missing chunks.
static TRANSPARENT_PIXEL: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Straight-alpha RGBA grid stored as a flat `Vec<Option<Arc<RgbaImage>>>` of
/// 64×64 chunks.  A missing chunk is fully transparent.
///
/// Chunks are `Arc`-shared, so `clone()` is the history snapshot: it only bumps
/// reference counts, and a later write COW-clones just the chunk it touches.
#[derive(Clone)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    chunks_per_row: u32,
    chunks: Vec<Option<Arc<RgbaImage>>>,
}

impl PixelBuffer {
    // ---- construction -------------------------------------------------------

    /// Create a fully transparent buffer.  Zero-sized requests are clamped to 1×1.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = if width == 0 || height == 0 {
            crate::log_warn!("PixelBuffer::new: {}×{} is empty, clamped to 1×1", width, height);
            (width.max(1), height.max(1))
        } else {
            (width, height)
        };
        let chunks_per_row = width.div_ceil(CHUNK_SIZE);
        let chunks_per_col = height.div_ceil(CHUNK_SIZE);
        Self {
            width,
            height,
            chunks_per_row,
            chunks: vec![None; (chunks_per_row * chunks_per_col) as usize],
        }
    }

    /// Bulk load from a flat `RgbaImage`.  Chunks with no visible pixel stay
    /// unallocated.  Chunk conversion runs on rayon.
    pub fn from_rgba_image(src: &RgbaImage) -> Self {
        let width = src.width();
        let height = src.height();
        let mut buf = Self::new(width, height);
        if buf.width != width || buf.height != height {
            return buf;
        }

        let chunks_x = buf.chunks_per_row as usize;
        let total = buf.chunks.len();
        let src_raw = src.as_raw();

        let converted: Vec<(usize, Option<Arc<RgbaImage>>)> = (0..total)
            .into_par_iter()
            .map(|flat| {
                let base_x = (flat % chunks_x) as u32 * CHUNK_SIZE;
                let base_y = (flat / chunks_x) as u32 * CHUNK_SIZE;
                let cw = CHUNK_SIZE.min(width - base_x) as usize;
                let ch = CHUNK_SIZE.min(height - base_y);
                let stride = CHUNK_SIZE as usize * 4;
                let mut data = vec![0u8; stride * CHUNK_SIZE as usize];
                let mut visible = false;

                for ly in 0..ch {
                    let src_start = ((base_y + ly) * width + base_x) as usize * 4;
                    let dst_start = ly as usize * stride;
                    let row = &src_raw[src_start..src_start + cw * 4];
                    visible |= row.chunks_exact(4).any(|px| px[3] != 0);
                    data[dst_start..dst_start + cw * 4].copy_from_slice(row);
                }

                let chunk = if visible {
                    RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, data).map(Arc::new)
                } else {
                    None
                };
                (flat, chunk)
            })
            .collect();

        for (idx, chunk) in converted {
            buf.chunks[idx] = chunk;
        }
        buf
    }

    /// Bulk store into a contiguous `RgbaImage`.
    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let out_stride = self.width as usize * 4;
        let out_raw: &mut [u8] = out.as_mut();
        for (cx, cy) in self.allocated_chunks() {
            let Some(chunk) = self.chunk(cx, cy) else { continue };
            let base_x = cx * CHUNK_SIZE;
            let base_y = cy * CHUNK_SIZE;
            let cw = CHUNK_SIZE.min(self.width - base_x) as usize;
            let ch = CHUNK_SIZE.min(self.height - base_y) as usize;
            let chunk_raw = chunk.as_raw();
            let chunk_stride = CHUNK_SIZE as usize * 4;
            for ly in 0..ch {
                let src = ly * chunk_stride;
                let dst = (base_y as usize + ly) * out_stride + base_x as usize * 4;
                out_raw[dst..dst + cw * 4].copy_from_slice(&chunk_raw[src..src + cw * 4]);
            }
        }
        out
    }

    /// Resample into a new buffer of the given size.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let flat = self.to_rgba_image();
        let scaled = image::imageops::resize(
            &flat,
            width.max(1),
            height.max(1),
            image::imageops::FilterType::Triangle,
        );
        Self::from_rgba_image(&scaled)
    }

    // ---- addressing ------------------------------------------------------------

    fn slot(&self, cx: u32, cy: u32) -> usize {
        (cy * self.chunks_per_row + cx) as usize
    }

    /// Chunk slot plus in-chunk offset of an in-bounds pixel.
    fn locate(&self, x: u32, y: u32) -> Option<(usize, u32, u32)> {
        (x < self.width && y < self.height)
            .then(|| (self.slot(x / CHUNK_SIZE, y / CHUNK_SIZE), x % CHUNK_SIZE, y % CHUNK_SIZE))
    }

    fn slot_mut(&mut self, slot: usize) -> &mut RgbaImage {
        let chunk = self.chunks[slot].get_or_insert_with(|| Arc::new(RgbaImage::new(CHUNK_SIZE, CHUNK_SIZE)));
        Arc::make_mut(chunk)
    }

    // ---- pixels ----------------------------------------------------------------

    /// Unallocated and out-of-range pixels read as transparent.
    #[inline]
    pub fn get_pixel(&self, x: u32, y: u32) -> &Rgba<u8> {
        match self.locate(x, y) {
            Some((slot, lx, ly)) => match &self.chunks[slot] {
                Some(chunk) => chunk.get_pixel(lx, ly),
                None => &TRANSPARENT_PIXEL,
            },
            None => &TRANSPARENT_PIXEL,
        }
    }

    #[inline]
    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.get_pixel(x, y)[3]
    }

    /// Out-of-range writes are dropped.
    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, pixel: Rgba<u8>) {
        if let Some((slot, lx, ly)) = self.locate(x, y) {
            self.slot_mut(slot).put_pixel(lx, ly, pixel);
        }
    }

    // ---- chunks ----------------------------------------------------------------

    pub fn chunk(&self, cx: u32, cy: u32) -> Option<&RgbaImage> {
        self.chunks.get(self.slot(cx, cy))?.as_deref()
    }

    /// An already allocated chunk, unshared first if a snapshot holds it.
    pub fn chunk_mut(&mut self, cx: u32, cy: u32) -> Option<&mut RgbaImage> {
        let slot = self.slot(cx, cy);
        self.chunks.get_mut(slot)?.as_mut().map(Arc::make_mut)
    }

    /// Like [`PixelBuffer::chunk_mut`], allocating a transparent chunk if needed.
    pub fn chunk_or_insert(&mut self, cx: u32, cy: u32) -> &mut RgbaImage {
        let slot = self.slot(cx, cy);
        self.slot_mut(slot)
    }

    /// `(cx, cy)` of every allocated chunk, row-major.
    pub fn allocated_chunks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let per_row = self.chunks_per_row;
        (0u32..)
            .zip(&self.chunks)
            .filter(|(_, chunk)| chunk.is_some())
            .map(move |(i, _)| (i % per_row, i / per_row))
    }

    // ---- bulk operations ----------------------------------------------------

    /// Drop all chunks.
    pub fn clear(&mut self) {
        for slot in &mut self.chunks {
            *slot = None;
        }
    }

    /// Number of pixels with non-zero alpha.
    pub fn painted_pixel_count(&self) -> usize {
        self.allocated_chunks()
            .map(|(cx, cy)| {
                let cw = CHUNK_SIZE.min(self.width - cx * CHUNK_SIZE);
                let ch = CHUNK_SIZE.min(self.height - cy * CHUNK_SIZE);
                self.chunk(cx, cy).map_or(0, |chunk| {
                    (0..ch)
                        .flat_map(|y| (0..cw).map(move |x| (x, y)))
                        .filter(|&(x, y)| chunk.get_pixel(x, y)[3] != 0)
                        .count()
                })
            })
            .sum()
    }

    pub fn width(&self) -> u32 { self.width }

    pub fn height(&self) -> u32 { self.height }

    /// Approximate memory owned by this buffer.  Chunks still shared with a
    /// snapshot only count their `Arc` pointer.
    pub fn memory_bytes(&self) -> usize {
        let chunk_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
        self.chunks.iter()
            .filter_map(|c| c.as_ref())
            .map(|arc| {
                if Arc::strong_count(arc) == 1 {
                    chunk_bytes
                } else {
                    std::mem::size_of::<usize>() * 2
                }
            })
            .sum()
    }
}

// ============================================================================
// BLENDING
// ============================================================================

/// Straight-alpha source-over: `top` composited on `base`.
#[inline]
pub fn blend_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 || base[3] == 0 {
        return top;
    }

    let ta = top[3] as f32 / 255.0;
    let ba = base[3] as f32 / 255.0;
    let out_a = ta + ba * (1.0 - ta);
    let channel = |t: u8, b: u8| -> u8 {
        let v = (t as f32 * ta + b as f32 * ba * (1.0 - ta)) / out_a;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        channel(top[0], base[0]),
        channel(top[1], base[1]),
        channel(top[2], base[2]),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Blend every allocated chunk of `layer` over `dst` (same dimensions).
fn composite_layer_over(dst: &mut RgbaImage, layer: &PixelBuffer) {
    let keys: Vec<(u32, u32)> = layer.allocated_chunks().collect();
    let (w, h) = (dst.width().min(layer.width()), dst.height().min(layer.height()));
    let base: &RgbaImage = dst;

    let blended: Vec<_> = keys.par_iter().filter_map(|&(cx, cy)| {
        let chunk = layer.chunk(cx, cy)?;
        let base_x = cx * CHUNK_SIZE;
        let base_y = cy * CHUNK_SIZE;
        if base_x >= w || base_y >= h {
            return None;
        }
        let cw = CHUNK_SIZE.min(w - base_x);
        let ch = CHUNK_SIZE.min(h - base_y);
        let mut pixels = Vec::with_capacity((cw * ch) as usize);
        for ly in 0..ch {
            for lx in 0..cw {
                let under = *base.get_pixel(base_x + lx, base_y + ly);
                pixels.push(blend_over(under, *chunk.get_pixel(lx, ly)));
            }
        }
        Some((base_x, base_y, cw, ch, pixels))
    }).collect();

    for (base_x, base_y, cw, ch, pixels) in blended {
        for ly in 0..ch {
            for lx in 0..cw {
                dst.put_pixel(base_x + lx, base_y + ly, pixels[(ly * cw + lx) as usize]);
            }
        }
    }
}

// ============================================================================
// BACKGROUND – immutable line art plus its fill-boundary mask
// ============================================================================

/// How the fill-boundary mask is derived from the line art.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BoundaryMode {
    /// Use the image alpha channel as-is.
    #[default]
    Alpha,
    /// Treat pixels at or above the luminance threshold as transparent.
    /// For opaque scans (JPEG line art on white paper).
    KeyWhite { threshold: u8 },
}

/// The loaded line art at native resolution.  Never mutated after load.
pub struct Background {
    image: RgbaImage,
    boundary: GrayImage,
}

impl Background {
    pub fn new(image: RgbaImage, mode: BoundaryMode) -> Self {
        let boundary = build_boundary_mask(&image, mode);
        Self { image, boundary }
    }

    pub fn width(&self) -> u32 { self.image.width() }

    pub fn height(&self) -> u32 { self.image.height() }

    pub fn image(&self) -> &RgbaImage { &self.image }

    /// Boundary alpha at a native-resolution coordinate (0 = fillable).
    #[inline]
    pub fn boundary_alpha(&self, x: u32, y: u32) -> u8 {
        if x >= self.boundary.width() || y >= self.boundary.height() {
            return 255;
        }
        self.boundary.get_pixel(x, y)[0]
    }
}

fn build_boundary_mask(image: &RgbaImage, mode: BoundaryMode) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (x, y, px) in image.enumerate_pixels() {
        let alpha = match mode {
            BoundaryMode::Alpha => px[3],
            BoundaryMode::KeyWhite { threshold } => {
                // Rec. 601 luma
                let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                if px[3] == 0 || luma >= threshold as f32 { 0 } else { px[3] }
            }
        };
        mask.put_pixel(x, y, Luma([alpha]));
    }
    mask
}

// ============================================================================
// CANVAS STATE – background + drawing layer + composited output
// ============================================================================

pub struct CanvasState {
    /// Render-surface size; the drawing layer always matches it.
    pub width: u32,
    pub height: u32,
    background: Background,
    /// Background resampled to the surface size, untransformed.
    fitted: RgbaImage,
    pub drawing: PixelBuffer,
    pub view: ViewTransform,
    output: RgbaImage,
    composite_generation: u64,
}

impl CanvasState {
    pub fn new(background: Background, width: u32, height: u32) -> Self {
        let (width, height) = (width.max(1), height.max(1));
        let fitted = transform::fit_background(background.image(), width, height);
        let mut state = Self {
            width,
            height,
            background,
            fitted,
            drawing: PixelBuffer::new(width, height),
            view: ViewTransform::default(),
            output: RgbaImage::new(width, height),
            composite_generation: 0,
        };
        state.recomposite();
        state
    }

    /// Reallocate the drawing layer for a new surface size.  The old drawing
    /// is lost unless `keep_drawing` rescales it into the new buffer.
    pub fn resize(&mut self, width: u32, height: u32, keep_drawing: bool) {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.width && height == self.height {
            return;
        }
        self.drawing = if keep_drawing {
            self.drawing.resized(width, height)
        } else {
            PixelBuffer::new(width, height)
        };
        self.width = width;
        self.height = height;
        self.fitted = transform::fit_background(self.background.image(), width, height);
        self.recomposite();
    }

    pub fn background(&self) -> &Background {
        &self.background
    }

    /// Canvas → native background coordinate mapping.
    pub fn source_mapping(&self) -> SourceMapping {
        SourceMapping::new(
            self.background.width(),
            self.background.height(),
            self.width,
            self.height,
        )
    }

    /// Boundary alpha for a canvas-space pixel.
    pub fn background_alpha_at(&self, x: u32, y: u32) -> u8 {
        let (sx, sy) = self.source_mapping().to_source(x, y);
        self.background.boundary_alpha(sx, sy)
    }

    /// Rebuild the visible output: background under the view transform, then
    /// the drawing layer pixel-for-pixel on top.
    pub fn recomposite(&mut self) {
        let mut out = if self.view.is_identity() {
            self.fitted.clone()
        } else {
            transform::draw_transformed(&self.fitted, &self.view)
        };
        composite_layer_over(&mut out, &self.drawing);
        self.output = out;
        self.composite_generation += 1;
    }

    /// Export composite: the fitted background drawn untransformed at surface
    /// size with the drawing layer on top.  Zoom and rotation only affect the
    /// on-screen view, never the exported page.
    pub fn flatten(&self) -> RgbaImage {
        let mut page = self.fitted.clone();
        composite_layer_over(&mut page, &self.drawing);
        page
    }

    /// The most recent composite.
    pub fn output(&self) -> &RgbaImage {
        &self.output
    }

    /// Number of recomposites performed so far.
    pub fn composite_generation(&self) -> u64 {
        self.composite_generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    #[test]
    fn pixel_buffer_reads_transparent_outside_bounds() {
        let mut buf = PixelBuffer::new(10, 10);
        buf.put_pixel(20, 3, Rgba([1, 2, 3, 255]));
        assert_eq!(*buf.get_pixel(20, 3), Rgba([0, 0, 0, 0]));
        assert_eq!(buf.allocated_chunks().count(), 0);
    }

    #[test]
    fn bulk_load_and_store_preserve_pixels_across_chunk_edges() {
        let mut img = RgbaImage::new(130, 70);
        img.put_pixel(0, 0, Rgba([9, 8, 7, 255]));
        img.put_pixel(64, 5, Rgba([1, 2, 3, 128]));
        img.put_pixel(129, 69, Rgba([4, 5, 6, 1]));

        let buf = PixelBuffer::from_rgba_image(&img);
        assert_eq!(buf.allocated_chunks().count(), 3);
        assert_eq!(buf.to_rgba_image(), img);
        assert_eq!(buf.painted_pixel_count(), 3);
    }

    #[test]
    fn chunk_accessors_allocate_only_on_insert() {
        let mut buf = PixelBuffer::new(130, 10);
        assert!(buf.chunk_mut(1, 0).is_none());
        assert_eq!(buf.allocated_chunks().count(), 0);

        buf.chunk_or_insert(2, 0).put_pixel(0, 3, Rgba([7, 7, 7, 255]));
        assert_eq!(buf.allocated_chunks().collect::<Vec<_>>(), vec![(2, 0)]);
        assert_eq!(*buf.get_pixel(128, 3), Rgba([7, 7, 7, 255]));

        let snapshot = buf.clone();
        if let Some(chunk) = buf.chunk_mut(2, 0) {
            chunk.put_pixel(0, 3, Rgba([0, 0, 0, 0]));
        }
        assert_eq!(buf.alpha_at(128, 3), 0);
        assert_eq!(snapshot.alpha_at(128, 3), 255);
        assert!(snapshot.chunk(0, 0).is_none());
    }

    #[test]
    fn clone_shares_chunks_until_written() {
        let mut buf = PixelBuffer::new(64, 64);
        buf.put_pixel(1, 1, Rgba([255, 0, 0, 255]));
        let snapshot = buf.clone();
        assert!(buf.memory_bytes() < CHUNK_SIZE as usize * CHUNK_SIZE as usize * 4);

        buf.put_pixel(2, 2, Rgba([0, 255, 0, 255]));
        assert_eq!(snapshot.alpha_at(2, 2), 0);
        assert_eq!(buf.alpha_at(2, 2), 255);
    }

    #[test]
    fn blend_over_mixes_half_transparent_red_onto_white() {
        let out = blend_over(Rgba([255, 255, 255, 255]), Rgba([255, 0, 0, 128]));
        assert_eq!(out[0], 255);
        assert!((126..=128).contains(&out[1]));
        assert_eq!(out[3], 255);
        assert_eq!(blend_over(Rgba([1, 2, 3, 4]), Rgba([0, 0, 0, 0])), Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn key_white_mask_makes_paper_fillable_and_ink_a_boundary() {
        let mut img = solid(4, 1, [250, 250, 250, 255]);
        img.put_pixel(1, 0, Rgba([10, 10, 10, 255]));
        let bg = Background::new(img, BoundaryMode::KeyWhite { threshold: 235 });
        assert_eq!(bg.boundary_alpha(0, 0), 0);
        assert_eq!(bg.boundary_alpha(1, 0), 255);
        assert_eq!(bg.boundary_alpha(9, 0), 255);
    }

    #[test]
    fn drawing_layer_composites_over_background() {
        let bg = Background::new(solid(8, 8, [0, 0, 255, 255]), BoundaryMode::Alpha);
        let mut state = CanvasState::new(bg, 8, 8);
        let first = state.composite_generation();
        state.drawing.put_pixel(3, 3, Rgba([255, 0, 0, 255]));
        state.recomposite();

        assert_eq!(state.composite_generation(), first + 1);
        assert_eq!(*state.output().get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(*state.output().get_pixel(4, 3), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn resize_clears_drawing_unless_kept() {
        let bg = Background::new(solid(10, 10, [0, 0, 0, 0]), BoundaryMode::Alpha);
        let mut state = CanvasState::new(bg, 10, 10);
        state.drawing.put_pixel(5, 5, Rgba([255, 0, 0, 255]));

        state.resize(20, 20, true);
        assert_eq!(state.drawing.width(), 20);
        assert!(state.drawing.painted_pixel_count() > 0);

        state.resize(10, 10, false);
        assert_eq!(state.drawing.painted_pixel_count(), 0);
        assert_eq!(state.output().dimensions(), (10, 10));
    }

    #[test]
    fn background_alpha_is_sampled_at_native_resolution() {
        let mut img = solid(20, 20, [0, 0, 0, 0]);
        img.put_pixel(10, 10, Rgba([0, 0, 0, 255]));
        let state = CanvasState::new(Background::new(img, BoundaryMode::Alpha), 10, 10);
        assert_eq!(state.background_alpha_at(5, 5), 255);
        assert_eq!(state.background_alpha_at(4, 5), 0);
    }
}
