use std::path::{Path, PathBuf};

use crate::canvas::BoundaryMode;
use crate::ops::fill::DEFAULT_FILL_TOLERANCE;

/// Luminance at or above which a pixel counts as paper in key-white mode.
pub const DEFAULT_KEY_WHITE_THRESHOLD: u8 = 235;

pub const DEFAULT_EXPORT_FILE_NAME: &str = "colored-image.png";

/// User preferences, persisted as `key=value` lines.
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    /// Base brush/eraser width in surface pixels (scaled by zoom).
    pub brush_width: f32,
    /// Drawing-layer alpha below which the bucket still treats a pixel as unpainted.
    pub fill_tolerance: u8,
    pub boundary_mode: BoundaryMode,
    pub max_undo_steps: usize,
    /// Rescale the drawing on container resize instead of clearing it.
    pub keep_drawing_on_resize: bool,
    pub export_file_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            brush_width: 10.0,
            fill_tolerance: DEFAULT_FILL_TOLERANCE,
            boundary_mode: BoundaryMode::Alpha,
            max_undo_steps: 100,
            keep_drawing_on_resize: false,
            export_file_name: DEFAULT_EXPORT_FILE_NAME.to_string(),
        }
    }
}

impl Settings {
    /// `<data dir>/ColorBook/settings.cfg`
    pub fn settings_path() -> PathBuf {
        crate::logger::app_data_dir().join("settings.cfg")
    }

    /// Load from the default location; defaults if missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(&Self::settings_path())
    }

    pub fn save(&self) {
        if let Err(e) = self.save_to(&Self::settings_path()) {
            crate::log_warn!("Settings: failed to save: {}", e);
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_config_string())
    }

    /// Lenient parse: unknown keys are ignored, bad values keep the default.
    pub fn parse(content: &str) -> Self {
        let mut s = Self::default();
        let mut key_white_threshold = DEFAULT_KEY_WHITE_THRESHOLD;
        let mut key_white = false;

        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            let Some((key, val)) = line.split_once('=') else { continue };
            let val = val.trim();
            match key.trim() {
                "brush_width" => {
                    if let Ok(w) = val.parse::<f32>()
                        && w.is_finite()
                        && w > 0.0
                    {
                        s.brush_width = w;
                    }
                }
                "fill_tolerance" => {
                    s.fill_tolerance = val.parse().unwrap_or(DEFAULT_FILL_TOLERANCE);
                }
                "boundary_mode" => {
                    key_white = val == "key-white";
                }
                "key_white_threshold" => {
                    key_white_threshold = val.parse().unwrap_or(DEFAULT_KEY_WHITE_THRESHOLD);
                }
                "max_undo_steps" => {
                    s.max_undo_steps = val.parse().unwrap_or(100);
                }
                "keep_drawing_on_resize" => {
                    s.keep_drawing_on_resize = val == "true";
                }
                "export_file_name" => {
                    if !val.is_empty() {
                        s.export_file_name = val.to_string();
                    }
                }
                _ => {}
            }
        }

        if key_white {
            s.boundary_mode = BoundaryMode::KeyWhite { threshold: key_white_threshold };
        }
        s
    }

    pub fn to_config_string(&self) -> String {
        let (mode_str, threshold) = match self.boundary_mode {
            BoundaryMode::Alpha => ("alpha", DEFAULT_KEY_WHITE_THRESHOLD),
            BoundaryMode::KeyWhite { threshold } => ("key-white", threshold),
        };
        format!(
            "brush_width={}\n\
             fill_tolerance={}\n\
             boundary_mode={mode_str}\n\
             key_white_threshold={threshold}\n\
             max_undo_steps={}\n\
             keep_drawing_on_resize={}\n\
             export_file_name={}\n",
            self.brush_width,
            self.fill_tolerance,
            self.max_undo_steps,
            self.keep_drawing_on_resize,
            self.export_file_name,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = Settings::load_from(&dir.path().join("nope.cfg"));
        assert_eq!(s, Settings::default());
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("settings.cfg");
        let s = Settings {
            brush_width: 4.5,
            fill_tolerance: 3,
            boundary_mode: BoundaryMode::KeyWhite { threshold: 200 },
            max_undo_steps: 12,
            keep_drawing_on_resize: true,
            export_file_name: "page.png".into(),
        };
        s.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), s);
    }

    #[test]
    fn bad_values_fall_back_per_key() {
        let s = Settings::parse("brush_width=-3\nfill_tolerance=lots\nmax_undo_steps=7\ngarbage\n# c=1\n");
        assert_eq!(s.brush_width, 10.0);
        assert_eq!(s.fill_tolerance, DEFAULT_FILL_TOLERANCE);
        assert_eq!(s.max_undo_steps, 7);
        assert_eq!(s.boundary_mode, BoundaryMode::Alpha);
    }
}
