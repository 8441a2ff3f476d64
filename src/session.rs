// ============================================================================
// COLORING SESSION - one canvas, its tools and its history
// ============================================================================
//
// Everything that was process-wide in a paint app (current tool, color, zoom,
// rotation) lives on the session, so independent sessions can coexist.

use image::{Rgb, RgbaImage};
use std::path::Path;

use crate::canvas::{Background, CanvasState, PixelBuffer};
use crate::components::history::HistoryStack;
use crate::components::tools::{DEFAULT_COLOR, Tool};
use crate::io::{AssetError, ExportMode, ExportOutcome};
use crate::ops::fill::FloodFill;
use crate::ops::stroke::{StrokeKind, StrokeRenderer};
use crate::ops::transform;
use crate::settings::Settings;

pub struct ColoringSession {
    canvas: CanvasState,
    history: HistoryStack,
    stroke: StrokeRenderer,
    flood: FloodFill,
    tool: Tool,
    color: Rgb<u8>,
    settings: Settings,
    /// On-screen position of the surface's top-left corner, in viewport coordinates.
    surface_origin: (f32, f32),
}

impl ColoringSession {
    /// Build a session whose surface is the background fitted into `container`.
    /// History is seeded with the blank drawing layer.
    pub fn new(background: Background, container: (u32, u32), settings: Settings) -> Self {
        let (w, h) = transform::fit_to_container(
            background.width(),
            background.height(),
            container.0,
            container.1,
        );
        crate::log_info!(
            "Session: {}×{} line art on a {}×{} surface",
            background.width(),
            background.height(),
            w,
            h
        );
        let canvas = CanvasState::new(background, w, h);
        let mut history = HistoryStack::new(settings.max_undo_steps);
        history.seed(&canvas.drawing);
        Self {
            flood: FloodFill::new(canvas.width, canvas.height, settings.fill_tolerance),
            canvas,
            history,
            stroke: StrokeRenderer::new(),
            tool: Tool::default(),
            color: DEFAULT_COLOR,
            settings,
            surface_origin: (0.0, 0.0),
        }
    }

    /// Like [`ColoringSession::new`], from a decoded image.  Zero-sized images
    /// are rejected rather than producing empty buffers.
    pub fn from_image(image: RgbaImage, container: (u32, u32), settings: Settings) -> Result<Self, AssetError> {
        if image.width() == 0 || image.height() == 0 {
            crate::log_err!("Session: line art is empty");
            return Err(AssetError::Empty("line art".to_string()));
        }
        let background = Background::new(image, settings.boundary_mode);
        Ok(Self::new(background, container, settings))
    }

    // ---- selection state ----------------------------------------------------

    pub fn tool(&self) -> Tool {
        self.tool
    }

    /// Switching tools mid-stroke finalizes the stroke first.
    pub fn set_tool(&mut self, tool: Tool) {
        if tool != self.tool {
            self.finish_stroke();
            self.tool = tool;
        }
    }

    pub fn color(&self) -> Rgb<u8> {
        self.color
    }

    pub fn set_color(&mut self, color: Rgb<u8>) {
        self.color = color;
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn set_brush_width(&mut self, width: f32) {
        if width.is_finite() && width > 0.0 {
            self.settings.brush_width = width;
        }
    }

    pub fn set_fill_tolerance(&mut self, tolerance: u8) {
        self.settings.fill_tolerance = tolerance;
        self.flood.set_tolerance(tolerance);
    }

    pub fn set_keep_drawing_on_resize(&mut self, keep: bool) {
        self.settings.keep_drawing_on_resize = keep;
    }

    // ---- view ----------------------------------------------------------------

    pub fn zoom(&self) -> f32 {
        self.canvas.view.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.canvas.view.set_zoom(zoom);
        self.canvas.recomposite();
    }

    pub fn rotation(&self) -> f32 {
        self.canvas.view.rotation
    }

    pub fn set_rotation(&mut self, degrees: f32) {
        self.canvas.view.set_rotation(degrees);
        self.canvas.recomposite();
    }

    /// Brush width in surface pixels: base width scaled by zoom.
    pub fn stroke_width(&self) -> f32 {
        self.settings.brush_width * self.canvas.view.zoom
    }

    pub fn set_surface_origin(&mut self, x: f32, y: f32) {
        self.surface_origin = (x, y);
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.canvas.width, self.canvas.height)
    }

    /// Viewport → surface-local coordinates.
    pub fn to_surface(&self, viewport: (f32, f32)) -> (f32, f32) {
        (viewport.0 - self.surface_origin.0, viewport.1 - self.surface_origin.1)
    }

    // ---- pointer input (viewport coordinates) -------------------------------

    /// Bucket fills at the point; brush and eraser start a stroke.
    /// Returns `true` when the output changed.
    pub fn pointer_down(&mut self, viewport: (f32, f32)) -> bool {
        let (x, y) = self.to_surface(viewport);
        match self.tool {
            Tool::Bucket => {
                if x < 0.0 || y < 0.0 {
                    return false;
                }
                self.fill_at(x as u32, y as u32) > 0
            }
            Tool::Brush | Tool::Eraser => self.begin_stroke_at(x, y),
        }
    }

    pub fn pointer_move(&mut self, viewport: (f32, f32)) -> bool {
        let (x, y) = self.to_surface(viewport);
        self.extend_stroke_to(x, y)
    }

    /// Ends the active stroke.  Returns `true` when a snapshot was recorded.
    pub fn pointer_up(&mut self) -> bool {
        self.finish_stroke()
    }

    /// Leaving the surface ends the stroke exactly like releasing the pointer.
    pub fn pointer_leave(&mut self) -> bool {
        self.finish_stroke()
    }

    // ---- actions (surface coordinates) ---------------------------------------

    /// Start a stroke with the current tool.  No-op for the bucket.
    pub fn begin_stroke_at(&mut self, x: f32, y: f32) -> bool {
        let Some(kind) = StrokeKind::for_tool(self.tool) else { return false };
        self.finish_stroke();
        let width = self.stroke_width();
        let dirty = self.stroke.begin_stroke(&mut self.canvas.drawing, kind, self.color, (x, y), width);
        self.canvas.recomposite();
        dirty.is_some()
    }

    pub fn extend_stroke_to(&mut self, x: f32, y: f32) -> bool {
        if !self.stroke.is_active() {
            return false;
        }
        let dirty = self.stroke.extend_stroke(&mut self.canvas.drawing, (x, y));
        if dirty.is_some() {
            self.canvas.recomposite();
        }
        dirty.is_some()
    }

    /// Finalize the stroke in progress, if any, and snapshot it.
    pub fn finish_stroke(&mut self) -> bool {
        if !self.stroke.end_stroke() {
            return false;
        }
        self.history.snapshot(&self.canvas.drawing);
        true
    }

    /// Bucket fill from a surface pixel.  Returns the number of pixels
    /// recolored; zero means nothing changed and no history entry was made.
    pub fn fill_at(&mut self, x: u32, y: u32) -> usize {
        self.finish_stroke();
        let region = {
            let canvas = &self.canvas;
            let mapping = canvas.source_mapping();
            let background = canvas.background();
            self.flood.fill(
                (x, y),
                self.color,
                |px, py| {
                    let (sx, sy) = mapping.to_source(px, py);
                    background.boundary_alpha(sx, sy)
                },
                |px, py| canvas.drawing.alpha_at(px, py),
            )
        };
        if region.is_empty() {
            crate::log_info!("Fill at ({}, {}) changed nothing", x, y);
            return 0;
        }

        region.commit(&mut self.canvas.drawing);
        self.canvas.recomposite();
        self.history.snapshot(&self.canvas.drawing);
        crate::log_info!("Fill at ({}, {}): {} pixels, bbox {:?}", x, y, region.len(), region.bbox());
        region.len()
    }

    pub fn undo(&mut self) -> bool {
        self.finish_stroke();
        let changed = self.history.undo(&mut self.canvas.drawing);
        if changed {
            self.canvas.recomposite();
        }
        changed
    }

    pub fn redo(&mut self) -> bool {
        self.finish_stroke();
        let changed = self.history.redo(&mut self.canvas.drawing);
        if changed {
            self.canvas.recomposite();
        }
        changed
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    /// Refit the surface to a new container.  The drawing is cleared unless
    /// `keep_drawing_on_resize` is set; history is kept either way.
    pub fn resize_to_container(&mut self, container_w: u32, container_h: u32) -> bool {
        let background = self.canvas.background();
        let (w, h) = transform::fit_to_container(background.width(), background.height(), container_w, container_h);
        if (w, h) == self.surface_size() {
            return false;
        }
        self.finish_stroke();
        crate::log_info!(
            "Resize surface {}×{} -> {}×{} (keep drawing: {})",
            self.canvas.width,
            self.canvas.height,
            w,
            h,
            self.settings.keep_drawing_on_resize
        );
        self.canvas.resize(w, h, self.settings.keep_drawing_on_resize);
        self.flood.resize(w, h);
        true
    }

    // ---- output ----------------------------------------------------------------

    pub fn canvas(&self) -> &CanvasState {
        &self.canvas
    }

    pub fn drawing(&self) -> &PixelBuffer {
        &self.canvas.drawing
    }

    /// The visible composite (background under the view transform + drawing).
    pub fn output(&self) -> &RgbaImage {
        self.canvas.output()
    }

    pub fn composite_generation(&self) -> u64 {
        self.canvas.composite_generation()
    }

    /// Export-ready page at surface size: background plus drawing, without
    /// the view transform.
    pub fn flatten(&self) -> RgbaImage {
        self.canvas.flatten()
    }

    pub fn export_png(&self, mode: ExportMode, dest: &Path) -> Result<ExportOutcome, AssetError> {
        crate::io::export_png(&self.flatten(), mode, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::BoundaryMode;
    use image::Rgba;

    fn blank_session(w: u32, h: u32) -> ColoringSession {
        let bg = Background::new(RgbaImage::new(w, h), BoundaryMode::Alpha);
        ColoringSession::new(bg, (w, h), Settings::default())
    }

    #[test]
    fn empty_image_is_rejected() {
        let result = ColoringSession::from_image(RgbaImage::new(0, 0), (10, 10), Settings::default());
        assert!(matches!(result, Err(AssetError::Empty(_))));
    }

    #[test]
    fn pointer_coordinates_are_offset_by_the_surface_origin() {
        let mut session = blank_session(40, 40);
        session.set_surface_origin(100.0, 50.0);
        session.set_color(Rgb([0, 0, 255]));
        assert!(session.pointer_down((110.0, 60.0)));
        assert_eq!(*session.drawing().get_pixel(10, 10), Rgba([0, 0, 255, 255]));
        assert!(session.pointer_up());
        assert!(!session.pointer_up());
        assert_eq!(session.history().undo_count(), 2);
    }

    #[test]
    fn pointer_leave_finalizes_like_pointer_up() {
        let mut session = blank_session(40, 40);
        session.pointer_down((5.0, 5.0));
        session.pointer_move((30.0, 5.0));
        assert!(session.pointer_leave());
        assert!(!session.pointer_move((30.0, 30.0)));
        assert_eq!(session.drawing().alpha_at(30, 30), 0);
    }

    #[test]
    fn bucket_outside_the_surface_is_a_no_op() {
        let mut session = blank_session(20, 20);
        session.set_tool(Tool::Bucket);
        assert!(!session.pointer_down((-3.0, 4.0)));
        assert!(!session.pointer_down((25.0, 4.0)));
        assert_eq!(session.history().undo_count(), 1);
    }

    #[test]
    fn stroke_width_follows_zoom() {
        let mut session = blank_session(20, 20);
        session.set_zoom(2.0);
        assert_eq!(session.stroke_width(), 20.0);
        session.set_zoom(100.0);
        assert_eq!(session.zoom(), crate::ops::transform::MAX_ZOOM);
    }

    #[test]
    fn resize_clears_the_drawing_but_keeps_history() {
        let mut session = blank_session(40, 20);
        session.set_tool(Tool::Bucket);
        assert_eq!(session.fill_at(0, 0), 800);

        assert!(session.resize_to_container(80, 80));
        assert_eq!(session.surface_size(), (80, 40));
        assert_eq!(session.drawing().painted_pixel_count(), 0);
        assert!(session.can_undo());

        // Redo after undo restores the old fill scaled to the new surface.
        assert!(session.undo());
        assert!(session.redo());
        assert_eq!(session.drawing().painted_pixel_count(), 80 * 40);
    }
}
