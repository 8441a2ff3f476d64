// ============================================================================
// VIEW TRANSFORM - surface fitting, zoom and rotation of the background view
// ============================================================================

use image::{RgbaImage, imageops};
use rayon::prelude::*;

pub const MIN_ZOOM: f32 = 0.1;
pub const MAX_ZOOM: f32 = 10.0;

/// Centered zoom + rotation applied to the background when compositing.
/// The drawing layer is never transformed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewTransform {
    /// Uniform scale factor (1.0 = 100%).
    pub zoom: f32,
    /// Clockwise rotation in degrees, kept in [0, 360).
    pub rotation: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self { zoom: 1.0, rotation: 0.0 }
    }
}

impl ViewTransform {
    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = if zoom.is_finite() { zoom.clamp(MIN_ZOOM, MAX_ZOOM) } else { 1.0 };
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.rotation = if degrees.is_finite() { degrees.rem_euclid(360.0) } else { 0.0 };
    }

    pub fn is_identity(&self) -> bool {
        (self.zoom - 1.0).abs() < 1e-6 && self.rotation.abs() < 1e-6
    }
}

/// Largest surface with the image's aspect ratio that fits the container.
/// Wider-than-image containers are height-limited, others width-limited.
pub fn fit_to_container(image_w: u32, image_h: u32, container_w: u32, container_h: u32) -> (u32, u32) {
    if image_w == 0 || image_h == 0 || container_w == 0 || container_h == 0 {
        return (1, 1);
    }
    let aspect = image_w as f64 / image_h as f64;
    let container_aspect = container_w as f64 / container_h as f64;
    let (w, h) = if container_aspect > aspect {
        let h = container_h as f64;
        (h * aspect, h)
    } else {
        let w = container_w as f64;
        (w, w / aspect)
    };
    ((w as u32).max(1), (h as u32).max(1))
}

/// Resample the line art to the surface size (no-op copy when it already matches).
pub fn fit_background(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    imageops::resize(image, width, height, imageops::FilterType::Triangle)
}

/// Draw `src` (already at surface size) into a new transparent surface of the
/// same size: translate to center, rotate, scale, draw centered.
///
/// Works backwards from each destination pixel center to a source position and
/// samples bilinearly; samples outside the source are transparent.
pub fn draw_transformed(src: &RgbaImage, view: &ViewTransform) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut dst = RgbaImage::new(w, h);
    let cx = w as f32 * 0.5;
    let cy = h as f32 * 0.5;
    let inv_zoom = if view.zoom.abs() > 1e-6 { 1.0 / view.zoom } else { 1.0 };
    let (sin, cos) = view.rotation.to_radians().sin_cos();

    let src_raw = src.as_raw();
    let row_bytes = w as usize * 4;
    let dst_raw: &mut [u8] = dst.as_mut();

    dst_raw.par_chunks_mut(row_bytes).enumerate().for_each(|(dy, row)| {
        let ry = dy as f32 + 0.5 - cy;
        for dx in 0..w as usize {
            let rx = dx as f32 + 0.5 - cx;
            // Inverse rotation, then inverse scale, back to pixel-index space.
            let sx = (cos * rx + sin * ry) * inv_zoom + cx - 0.5;
            let sy = (-sin * rx + cos * ry) * inv_zoom + cy - 0.5;
            let px = bilinear_sample(src_raw, w, h, sx, sy);
            row[dx * 4..dx * 4 + 4].copy_from_slice(&px);
        }
    });
    dst
}

/// Bilinear sample from a flat RGBA buffer; taps outside are transparent.
fn bilinear_sample(raw: &[u8], w: u32, h: u32, x: f32, y: f32) -> [u8; 4] {
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    if x0 < -1 || y0 < -1 || x0 >= w as i64 || y0 >= h as i64 {
        return [0; 4];
    }
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let tap = |sx: i64, sy: i64| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
            [0.0; 4]
        } else {
            let i = (sy as usize * w as usize + sx as usize) * 4;
            [raw[i] as f32, raw[i + 1] as f32, raw[i + 2] as f32, raw[i + 3] as f32]
        }
    };

    let tl = tap(x0, y0);
    let tr = tap(x0 + 1, y0);
    let bl = tap(x0, y0 + 1);
    let br = tap(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bot = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = (top + (bot - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn fit_is_height_limited_in_wide_containers() {
        assert_eq!(fit_to_container(200, 100, 1000, 100), (200, 100));
        assert_eq!(fit_to_container(200, 100, 300, 1000), (300, 150));
        assert_eq!(fit_to_container(100, 100, 0, 50), (1, 1));
    }

    #[test]
    fn zoom_is_clamped_and_rotation_wrapped() {
        let mut view = ViewTransform::default();
        assert!(view.is_identity());
        view.set_zoom(50.0);
        assert_eq!(view.zoom, MAX_ZOOM);
        view.set_rotation(-90.0);
        assert_eq!(view.rotation, 270.0);
        view.set_rotation(f32::NAN);
        assert_eq!(view.rotation, 0.0);
    }

    #[test]
    fn half_turn_maps_corner_to_opposite_corner() {
        let mut src = RgbaImage::new(4, 4);
        src.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let view = ViewTransform { zoom: 1.0, rotation: 180.0 };
        let out = draw_transformed(&src, &view);
        assert_eq!(*out.get_pixel(3, 3), Rgba([255, 0, 0, 255]));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn zoom_out_leaves_transparent_margin() {
        let src = RgbaImage::from_pixel(10, 10, Rgba([0, 255, 0, 255]));
        let view = ViewTransform { zoom: 0.5, rotation: 0.0 };
        let out = draw_transformed(&src, &view);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(*out.get_pixel(5, 5), Rgba([0, 255, 0, 255]));
    }
}
