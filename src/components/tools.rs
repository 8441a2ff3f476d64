use image::Rgb;

/// The active painting tool.  Exactly one is selected per session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    Bucket,
}

impl Tool {
    pub fn label(&self) -> &'static str {
        match self {
            Tool::Brush => "Brush",
            Tool::Eraser => "Eraser",
            Tool::Bucket => "Bucket",
        }
    }

    pub fn all() -> &'static [Tool] {
        &[Tool::Brush, Tool::Eraser, Tool::Bucket]
    }

    /// Parse a tool name as written in `-a/--action` steps (case-insensitive).
    pub fn from_name(name: &str) -> Option<Tool> {
        match name.trim().to_ascii_lowercase().as_str() {
            "brush" | "paint" => Some(Tool::Brush),
            "eraser" | "erase" => Some(Tool::Eraser),
            "bucket" | "fill" => Some(Tool::Bucket),
            _ => None,
        }
    }
}

/// Color a fresh session starts with.
pub const DEFAULT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Fixed swatches offered next to the color picker.
pub const PALETTE: [Rgb<u8>; 12] = [
    Rgb([0, 0, 0]),
    Rgb([255, 255, 255]),
    Rgb([230, 25, 25]),
    Rgb([245, 130, 30]),
    Rgb([255, 215, 0]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([70, 50, 190]),
    Rgb([145, 30, 180]),
    Rgb([240, 110, 170]),
    Rgb([140, 85, 40]),
    Rgb([128, 128, 128]),
];

/// Parse `RRGGBB` or `#RRGGBB`.
pub fn parse_hex_color(s: &str) -> Option<Rgb<u8>> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}

/// Format as `#rrggbb`.
pub fn to_hex_color(color: Rgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_with_or_without_hash() {
        assert_eq!(parse_hex_color("#FF8000"), Some(Rgb([255, 128, 0])));
        assert_eq!(parse_hex_color("00ff7f"), Some(Rgb([0, 255, 127])));
        assert_eq!(parse_hex_color("12345"), None);
        assert_eq!(parse_hex_color("zz0000"), None);
        assert_eq!(to_hex_color(Rgb([255, 128, 0])), "#ff8000");
    }

    #[test]
    fn tool_names_round_trip_through_labels() {
        for tool in Tool::all() {
            assert_eq!(Tool::from_name(tool.label()), Some(*tool));
        }
        assert_eq!(Tool::from_name("fill"), Some(Tool::Bucket));
        assert_eq!(Tool::from_name("lasso"), None);
    }
}
