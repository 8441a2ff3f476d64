// ============================================================================
// COLORBOOK APP - thin eframe shell around a ColoringSession
// ============================================================================

use eframe::egui;
use egui::{Color32, ColorImage, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use image::Rgb;
use std::path::PathBuf;

use crate::components::tools::{PALETTE, Tool};
use crate::io::{BackgroundLoader, ExportMode, ExportOutcome, IMAGE_EXTENSIONS};
use crate::ops::transform::{MAX_ZOOM, MIN_ZOOM};
use crate::session::ColoringSession;
use crate::settings::Settings;

/// What the canvas area is showing.
enum PageState {
    /// Nothing requested yet.
    Empty,
    Loading(PathBuf),
    Ready(ColoringSession),
    /// Line art failed to load; no drawing surface exists.
    Unavailable(String),
}

pub struct ColorBookApp {
    page: PageState,
    loader: BackgroundLoader,
    settings: Settings,
    texture: Option<TextureHandle>,
    texture_generation: u64,
    /// Last canvas-area size, used to size a freshly loaded page.
    container: (u32, u32),
    status: Option<String>,
}

impl ColorBookApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: Settings, startup_file: Option<PathBuf>) -> Self {
        let mut app = Self {
            page: PageState::Empty,
            loader: BackgroundLoader::new(),
            settings,
            texture: None,
            texture_generation: 0,
            container: (800, 600),
            status: None,
        };
        if let Some(path) = startup_file {
            app.open_path(path);
        }
        app
    }

    fn open_path(&mut self, path: PathBuf) {
        crate::log_info!("Opening {}", path.display());
        self.loader.request(path.clone());
        self.page = PageState::Loading(path);
    }

    fn open_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Images", IMAGE_EXTENSIONS)
            .pick_file()
        {
            self.open_path(path);
        }
    }

    fn poll_loader(&mut self, ctx: &egui::Context) {
        if let Some(loaded) = self.loader.poll() {
            let result = loaded
                .result
                .and_then(|img| ColoringSession::from_image(img, self.container, self.settings.clone()));
            self.page = match result {
                Ok(session) => {
                    self.texture = None;
                    self.status = None;
                    PageState::Ready(session)
                }
                Err(e) => {
                    crate::log_err!("Failed to load {}: {}", loaded.path.display(), e);
                    PageState::Unavailable(format!("Asset unavailable: {}", e))
                }
            };
        }
        if self.loader.is_pending() {
            ctx.request_repaint();
        }
    }

    fn export(&mut self) {
        let PageState::Ready(session) = &self.page else { return };
        let mode = ExportMode::platform_default();
        let dest = match mode {
            ExportMode::Download => match rfd::FileDialog::new()
                .set_file_name(&self.settings.export_file_name)
                .add_filter("PNG", &["png"])
                .save_file()
            {
                Some(p) => p,
                None => return,
            },
            ExportMode::Inline => PathBuf::from(&self.settings.export_file_name),
        };
        self.status = Some(match session.export_png(mode, &dest) {
            Ok(ExportOutcome::Saved(p)) => format!("Saved {}", p.display()),
            Ok(ExportOutcome::OpenedInline(p)) => format!("Opened {} for saving", p.display()),
            Err(e) => {
                crate::log_err!("Export failed: {}", e);
                format!("Export failed: {}", e)
            }
        });
    }

    fn toolbar(&mut self, ui: &mut egui::Ui) {
        let mut want_open = false;
        let mut want_export = false;
        let mut settings_changed = false;

        ui.horizontal_wrapped(|ui| {
            if ui.button("Open…").clicked() {
                want_open = true;
            }

            let PageState::Ready(session) = &mut self.page else { return };
            if ui.button("Export").clicked() {
                want_export = true;
            }
            ui.separator();

            for tool in Tool::all() {
                if ui.selectable_label(session.tool() == *tool, tool.label()).clicked() {
                    session.set_tool(*tool);
                }
            }
            ui.separator();

            let mut rgb = session.color().0;
            if ui.color_edit_button_srgb(&mut rgb).changed() {
                session.set_color(Rgb(rgb));
            }
            for swatch in PALETTE {
                let (rect, response) = ui.allocate_exact_size(Vec2::splat(18.0), Sense::click());
                let fill = Color32::from_rgb(swatch[0], swatch[1], swatch[2]);
                ui.painter().rect_filled(rect, 3.0, fill);
                if session.color() == swatch {
                    ui.painter().rect_stroke(rect, 3.0, ui.visuals().selection.stroke);
                }
                if response.clicked() {
                    session.set_color(swatch);
                }
            }
            ui.separator();

            if ui.add_enabled(session.can_undo(), egui::Button::new("Undo")).clicked() {
                session.undo();
            }
            if ui.add_enabled(session.can_redo(), egui::Button::new("Redo")).clicked() {
                session.redo();
            }
            ui.separator();

            let mut width = session.settings().brush_width;
            let resp = ui.add(egui::Slider::new(&mut width, 1.0..=80.0).text("Brush"));
            if resp.changed() {
                session.set_brush_width(width);
                self.settings.brush_width = session.settings().brush_width;
            }
            settings_changed |= resp.drag_released();

            let mut zoom = session.zoom();
            if ui
                .add(egui::Slider::new(&mut zoom, MIN_ZOOM..=MAX_ZOOM).logarithmic(true).text("Zoom"))
                .changed()
            {
                session.set_zoom(zoom);
            }
            let mut rotation = session.rotation();
            if ui
                .add(egui::Slider::new(&mut rotation, 0.0..=359.0).suffix("°").text("Rotate"))
                .changed()
            {
                session.set_rotation(rotation);
            }

            let mut keep = self.settings.keep_drawing_on_resize;
            if ui.checkbox(&mut keep, "Keep drawing on resize").changed() {
                self.settings.keep_drawing_on_resize = keep;
                session.set_keep_drawing_on_resize(keep);
                settings_changed = true;
            }
        });

        if settings_changed {
            self.settings.save();
        }
        if want_export {
            self.export();
        }
        if want_open {
            self.open_dialog();
        }
    }

    fn canvas_area(&mut self, ui: &mut egui::Ui) {
        let area = ui.available_rect_before_wrap();
        self.container = (area.width().max(1.0) as u32, area.height().max(1.0) as u32);

        let session = match &mut self.page {
            PageState::Ready(session) => session,
            PageState::Empty => {
                ui.centered_and_justified(|ui| ui.label("Open a coloring page to start."));
                return;
            }
            PageState::Loading(path) => {
                ui.centered_and_justified(|ui| {
                    ui.spinner();
                    ui.label(format!("Loading {}…", path.display()));
                });
                return;
            }
            PageState::Unavailable(msg) => {
                ui.centered_and_justified(|ui| ui.colored_label(Color32::RED, msg.as_str()));
                return;
            }
        };

        session.resize_to_container(self.container.0, self.container.1);
        let (w, h) = session.surface_size();
        let rect = Rect::from_center_size(area.center(), Vec2::new(w as f32, h as f32));
        let response = ui.allocate_rect(rect, Sense::click_and_drag());
        session.set_surface_origin(rect.min.x, rect.min.y);

        // Forward pointer input.
        let (pos, pressed, down, released) = ui.input(|i| {
            (
                i.pointer.interact_pos(),
                i.pointer.primary_pressed(),
                i.pointer.primary_down(),
                i.pointer.primary_released(),
            )
        });
        if let Some(pos) = pos {
            let inside = rect.contains(pos);
            if pressed && inside && response.hovered() {
                session.pointer_down((pos.x, pos.y));
            } else if down {
                if inside {
                    session.pointer_move((pos.x, pos.y));
                } else {
                    session.pointer_leave();
                }
            }
        }
        if released {
            session.pointer_up();
        }

        // Upload the composite when it changed.
        if self.texture.is_none() || self.texture_generation != session.composite_generation() {
            let out = session.output();
            let image = ColorImage::from_rgba_unmultiplied([out.width() as usize, out.height() as usize], out.as_raw());
            match &mut self.texture {
                Some(tex) => tex.set(image, TextureOptions::LINEAR),
                None => self.texture = Some(ui.ctx().load_texture("colorbook_canvas", image, TextureOptions::LINEAR)),
            }
            self.texture_generation = session.composite_generation();
        }

        ui.painter().rect_filled(rect, 0.0, Color32::WHITE);
        if let Some(tex) = &self.texture {
            let uv = Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0));
            ui.painter().image(tex.id(), rect, uv, Color32::WHITE);
        }
    }
}

impl eframe::App for ColorBookApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_loader(ctx);

        // --- Keyboard shortcuts ---
        if let PageState::Ready(session) = &mut self.page {
            let (undo, redo) = ctx.input(|i| {
                let cmd = i.modifiers.command;
                (
                    cmd && !i.modifiers.shift && i.key_pressed(egui::Key::Z),
                    cmd && (i.key_pressed(egui::Key::Y) || (i.modifiers.shift && i.key_pressed(egui::Key::Z))),
                )
            });
            if undo {
                session.undo();
            } else if redo {
                session.redo();
            }
        }

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.toolbar(ui));

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if let PageState::Ready(session) = &self.page {
                    let (w, h) = session.surface_size();
                    ui.label(format!("{}×{}  zoom {:.0}%", w, h, session.zoom() * 100.0));
                    ui.separator();
                }
                if let Some(status) = &self.status {
                    ui.label(status);
                }
            });
        });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::from_gray(60)))
            .show(ctx, |ui| self.canvas_area(ui));
    }
}
