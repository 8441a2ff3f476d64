// ============================================================================
// ColorBook CLI - headless coloring via command-line arguments
// ============================================================================
//
// Usage examples:
//   colorbook -i page.png -a fill@120,80 -o colored.png
//   colorbook -i page.png --color ff0000 -a fill@51,51 -a color@0000ff -a brush@10,10:90,90
//   colorbook -i scan.jpg --boundary key-white --size 800x600 -a fill@400,300 -a undo
//
// Actions run in the order given, against a surface fitted to --size (or the
// image's own size).  No window is opened.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use image::Rgb;

use crate::canvas::BoundaryMode;
use crate::components::tools::{Tool, parse_hex_color, to_hex_color};
use crate::io::{ExportMode, ExportOutcome, load_background_sync};
use crate::session::ColoringSession;
use crate::settings::{DEFAULT_KEY_WHITE_THRESHOLD, Settings};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// One step of a headless coloring run.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// Bucket fill from a surface pixel.
    Fill(u32, u32),
    /// Brush stroke through the given surface points.
    Brush(Vec<(f32, f32)>),
    /// Eraser stroke through the given surface points.
    Erase(Vec<(f32, f32)>),
    Color(Rgb<u8>),
    Undo,
    Redo,
    Zoom(f32),
    Rotate(f32),
}

/// ColorBook headless colorer.
#[derive(Parser, Debug)]
#[command(
    name = "colorbook",
    about = "ColorBook headless coloring",
    long_about = "Load line art, apply fills and strokes in order, and export the\n\
                  colored page as PNG without opening the GUI.\n\n\
                  Actions (repeat -a, applied in order):\n  \
                  fill@X,Y            bucket fill from a surface pixel\n  \
                  brush@X,Y:X,Y:...   brush stroke through the points\n  \
                  erase@X,Y:X,Y:...   eraser stroke through the points\n  \
                  color@RRGGBB        change the current color\n  \
                  zoom@Z  rotate@DEG  view transform of the background\n  \
                  undo  redo"
)]
pub struct CliArgs {
    /// Line-art image (PNG with transparency, or any image with --boundary key-white).
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output PNG path.  Defaults to the export file name next to the input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Action to apply; repeatable.
    #[arg(short = 'a', long = "action", value_name = "ACTION", value_parser = parse_action)]
    pub actions: Vec<Action>,

    /// Container size the surface is fitted into, e.g. 800x600.
    #[arg(long, value_name = "WxH", value_parser = parse_size)]
    pub size: Option<(u32, u32)>,

    /// Starting color (RRGGBB).
    #[arg(long, value_name = "RRGGBB", value_parser = parse_color_arg)]
    pub color: Option<Rgb<u8>>,

    /// Base brush width in surface pixels.
    #[arg(long, value_name = "PX")]
    pub brush_width: Option<f32>,

    /// Drawing-layer alpha below which a pixel still counts as unpainted (0-255).
    #[arg(long, value_name = "0-255")]
    pub tolerance: Option<u8>,

    /// How fill boundaries are read from the line art: alpha or key-white.
    #[arg(long, value_name = "MODE", value_parser = parse_boundary)]
    pub boundary: Option<BoundaryMode>,

    /// Open the result in the system viewer instead of only writing it.
    #[arg(long)]
    pub open: bool,

    /// Print each action and timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

impl CliArgs {
    /// Returns `true` when `--input`/`-i` is present in the real process arguments.
    /// Used by `main()` to route before creating an eframe window.
    pub fn is_cli_mode() -> bool {
        std::env::args().any(|a| a == "--input" || a == "-i" || a.starts_with("--input="))
    }

    /// Stored settings with command-line overrides applied.
    fn effective_settings(&self, mut settings: Settings) -> Settings {
        if let Some(w) = self.brush_width
            && w.is_finite()
            && w > 0.0
        {
            settings.brush_width = w;
        }
        if let Some(t) = self.tolerance {
            settings.fill_tolerance = t;
        }
        if let Some(mode) = self.boundary {
            settings.boundary_mode = mode;
        }
        settings
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the headless pipeline and return an OS exit code.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    let settings = args.effective_settings(Settings::load());
    match run_with_settings(&args, settings) {
        Ok(outcome) => {
            let path = match &outcome {
                ExportOutcome::Saved(p) | ExportOutcome::OpenedInline(p) => p,
            };
            if args.verbose {
                println!(
                    "  → {} ({:.0}ms)",
                    path.display(),
                    start.elapsed().as_secs_f64() * 1000.0
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            crate::log_err!("CLI: {}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_with_settings(args: &CliArgs, settings: Settings) -> Result<ExportOutcome, String> {
    // -- Step 1: Load ----------------------------------------------------
    let image = load_background_sync(&args.input)
        .map_err(|e| format!("load failed: {}", e))?;
    let container = args.size.unwrap_or(image.dimensions());
    let output = output_path(&args.input, args.output.as_deref(), &settings.export_file_name);

    let mut session = ColoringSession::from_image(image, container, settings)
        .map_err(|e| e.to_string())?;
    if let Some(color) = args.color {
        session.set_color(color);
    }
    if args.verbose {
        let (w, h) = session.surface_size();
        println!("  surface {}×{}", w, h);
        if let Some(log) = crate::logger::log_path() {
            println!("  log {}", log.display());
        }
    }

    // -- Step 2: Apply actions in order ----------------------------------
    for action in &args.actions {
        let summary = apply_action(&mut session, action);
        if args.verbose {
            println!("  {}", summary);
        }
    }

    // -- Step 3: Export ----------------------------------------------------
    let mode = if args.open { ExportMode::Inline } else { ExportMode::Download };
    session
        .export_png(mode, &output)
        .map_err(|e| format!("export failed: {}", e))
}

/// Apply one action and describe what it did.
pub fn apply_action(session: &mut ColoringSession, action: &Action) -> String {
    match action {
        Action::Fill(x, y) => {
            let n = session.fill_at(*x, *y);
            format!("fill ({}, {}) {}: {} pixels", x, y, to_hex_color(session.color()), n)
        }
        Action::Brush(points) | Action::Erase(points) => {
            let tool = if matches!(action, Action::Brush(_)) { Tool::Brush } else { Tool::Eraser };
            session.set_tool(tool);
            let mut iter = points.iter();
            if let Some(&(x, y)) = iter.next() {
                session.begin_stroke_at(x, y);
                for &(x, y) in iter {
                    session.extend_stroke_to(x, y);
                }
                session.finish_stroke();
            }
            format!("{} through {} point(s)", tool.label().to_lowercase(), points.len())
        }
        Action::Color(c) => {
            session.set_color(*c);
            format!("color {}", to_hex_color(*c))
        }
        Action::Undo => format!("undo: {}", if session.undo() { "ok" } else { "nothing to undo" }),
        Action::Redo => format!("redo: {}", if session.redo() { "ok" } else { "nothing to redo" }),
        Action::Zoom(z) => {
            session.set_zoom(*z);
            format!("zoom {:.2}", session.zoom())
        }
        Action::Rotate(d) => {
            session.set_rotation(*d);
            format!("rotate {:.1}°", session.rotation())
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn parse_point(s: &str) -> Result<(f32, f32), String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y but got '{}'", s))?;
    let x: f32 = x.trim().parse().map_err(|_| format!("bad x coordinate in '{}'", s))?;
    let y: f32 = y.trim().parse().map_err(|_| format!("bad y coordinate in '{}'", s))?;
    if !x.is_finite() || !y.is_finite() {
        return Err(format!("coordinates must be finite: '{}'", s));
    }
    Ok((x, y))
}

fn parse_points(s: &str) -> Result<Vec<(f32, f32)>, String> {
    let points = s.split(':').map(parse_point).collect::<Result<Vec<_>, _>>()?;
    if points.is_empty() {
        return Err("a stroke needs at least one point".to_string());
    }
    Ok(points)
}

/// Parse `name` or `name@args` into an [`Action`].
pub fn parse_action(s: &str) -> Result<Action, String> {
    let (name, arg) = match s.split_once('@') {
        Some((n, a)) => (n.trim().to_ascii_lowercase(), Some(a.trim())),
        None => (s.trim().to_ascii_lowercase(), None),
    };
    let need = || arg.ok_or_else(|| format!("action '{}' needs an argument ({}@...)", name, name));

    // Stroke steps accept any brush or eraser alias.
    if let Some(tool @ (Tool::Brush | Tool::Eraser)) = Tool::from_name(&name) {
        let points = parse_points(need()?)?;
        return Ok(if tool == Tool::Brush { Action::Brush(points) } else { Action::Erase(points) });
    }

    match name.as_str() {
        "fill" => {
            let (x, y) = parse_point(need()?)?;
            if x < 0.0 || y < 0.0 {
                return Err(format!("fill point must not be negative: '{}'", s));
            }
            Ok(Action::Fill(x as u32, y as u32))
        }
        "color" => Ok(Action::Color(parse_color_arg(need()?)?)),
        "zoom" => need()?
            .parse()
            .map(Action::Zoom)
            .map_err(|_| format!("bad zoom factor in '{}'", s)),
        "rotate" => need()?
            .parse()
            .map(Action::Rotate)
            .map_err(|_| format!("bad rotation in '{}'", s)),
        "undo" => Ok(Action::Undo),
        "redo" => Ok(Action::Redo),
        _ => Err(format!("unknown action '{}'", name)),
    }
}

/// Parse `WxH`.
pub fn parse_size(s: &str) -> Result<(u32, u32), String> {
    let (w, h) = s
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().to_string(), h.trim().to_string()))
        .ok_or_else(|| format!("expected WxH but got '{}'", s))?;
    let w: u32 = w.parse().map_err(|_| format!("bad width in '{}'", s))?;
    let h: u32 = h.parse().map_err(|_| format!("bad height in '{}'", s))?;
    if w == 0 || h == 0 {
        return Err(format!("size must be non-zero: '{}'", s));
    }
    Ok((w, h))
}

fn parse_color_arg(s: &str) -> Result<Rgb<u8>, String> {
    parse_hex_color(s).ok_or_else(|| format!("expected RRGGBB color but got '{}'", s))
}

fn parse_boundary(s: &str) -> Result<BoundaryMode, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "alpha" => Ok(BoundaryMode::Alpha),
        "key-white" | "keywhite" | "white" => Ok(BoundaryMode::KeyWhite {
            threshold: DEFAULT_KEY_WHITE_THRESHOLD,
        }),
        other => Err(format!("unknown boundary mode '{}' (alpha, key-white)", other)),
    }
}

/// `--output` if given, else the export file name next to the input.
/// Never returns the input path itself.
fn output_path(input: &Path, output: Option<&Path>, export_name: &str) -> PathBuf {
    if let Some(out) = output {
        return out.to_path_buf();
    }
    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(export_name);
    if candidate == input {
        let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        parent.join(format!("{}_colored.png", stem))
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn actions_parse() {
        assert_eq!(parse_action("fill@12,34"), Ok(Action::Fill(12, 34)));
        assert_eq!(
            parse_action("brush@1,2:3.5,4"),
            Ok(Action::Brush(vec![(1.0, 2.0), (3.5, 4.0)]))
        );
        assert_eq!(parse_action("Erase@5,5"), Ok(Action::Erase(vec![(5.0, 5.0)])));
        assert_eq!(parse_action("eraser@5,5"), Ok(Action::Erase(vec![(5.0, 5.0)])));
        assert_eq!(parse_action("paint@2,3"), Ok(Action::Brush(vec![(2.0, 3.0)])));
        assert!(parse_action("brush").is_err());
        assert_eq!(parse_action("color@#00ff00"), Ok(Action::Color(Rgb([0, 255, 0]))));
        assert_eq!(parse_action("undo"), Ok(Action::Undo));
        assert_eq!(parse_action("rotate@-90"), Ok(Action::Rotate(-90.0)));
        assert!(parse_action("fill").is_err());
        assert!(parse_action("fill@-1,3").is_err());
        assert!(parse_action("brush@1,2:oops").is_err());
        assert!(parse_action("smudge@1,1").is_err());
    }

    #[test]
    fn sizes_parse() {
        assert_eq!(parse_size("800x600"), Ok((800, 600)));
        assert_eq!(parse_size("10X20"), Ok((10, 20)));
        assert!(parse_size("0x5").is_err());
        assert!(parse_size("800").is_err());
    }

    #[test]
    fn default_output_never_overwrites_the_input() {
        let input = Path::new("pages/colored-image.png");
        let out = output_path(input, None, "colored-image.png");
        assert_eq!(out, Path::new("pages/colored-image_colored.png"));
        assert_eq!(
            output_path(Path::new("pages/cat.png"), None, "colored-image.png"),
            Path::new("pages/colored-image.png")
        );
    }

    #[test]
    fn args_keep_action_order() {
        let args = CliArgs::try_parse_from([
            "colorbook", "-i", "in.png", "-a", "fill@1,1", "--action", "color@0000ff", "-a", "undo",
            "--boundary", "key-white", "--size", "40x30",
        ])
        .unwrap();
        assert_eq!(
            args.actions,
            vec![Action::Fill(1, 1), Action::Color(Rgb([0, 0, 255])), Action::Undo]
        );
        assert_eq!(args.size, Some((40, 30)));
        let settings = args.effective_settings(Settings::default());
        assert_eq!(settings.boundary_mode, BoundaryMode::KeyWhite { threshold: 235 });
    }

    #[test]
    fn headless_run_fills_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.png");
        let output = dir.path().join("out.png");

        // 20×20 transparent page with a vertical line splitting it in two.
        let mut art = RgbaImage::new(20, 20);
        for y in 0..20 {
            art.put_pixel(10, y, Rgba([0, 0, 0, 255]));
        }
        art.save(&input).unwrap();

        let args = CliArgs::try_parse_from([
            "colorbook",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--color",
            "ff0000",
            "-a",
            "fill@2,2",
        ])
        .unwrap();
        let outcome = run_with_settings(&args, args.effective_settings(Settings::default())).unwrap();
        assert_eq!(outcome, ExportOutcome::Saved(output.clone()));

        let result = image::open(&output).unwrap().to_rgba8();
        assert_eq!(*result.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*result.get_pixel(9, 19), Rgba([255, 0, 0, 255]));
        assert_eq!(*result.get_pixel(10, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(result.get_pixel(15, 5)[3], 0);
    }
}
