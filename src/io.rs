use image::codecs::png::PngEncoder;
use image::{ImageEncoder, ImageError, RgbaImage};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for loading line art and exporting pages.
#[derive(Debug)]
pub enum AssetError {
    Io(std::io::Error),
    Decode(String),
    /// The image decoded but has no pixels.
    Empty(String),
    Encode(String),
}

impl std::fmt::Display for AssetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssetError::Io(e) => write!(f, "I/O error: {}", e),
            AssetError::Decode(e) => write!(f, "Decode error: {}", e),
            AssetError::Empty(what) => write!(f, "Asset unavailable: {} has no pixels", what),
            AssetError::Encode(e) => write!(f, "Encode error: {}", e),
        }
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AssetError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AssetError {
    fn from(e: std::io::Error) -> Self {
        AssetError::Io(e)
    }
}

impl From<ImageError> for AssetError {
    fn from(e: ImageError) -> Self {
        match e {
            ImageError::IoError(io) => AssetError::Io(io),
            ImageError::Encoding(enc) => AssetError::Encode(enc.to_string()),
            other => AssetError::Decode(other.to_string()),
        }
    }
}

// ============================================================================
// LOADING
// ============================================================================

/// Image extensions offered in the open dialog.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp", "gif"];

fn ensure_not_empty(img: RgbaImage, what: &str) -> Result<RgbaImage, AssetError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(AssetError::Empty(what.to_string()));
    }
    Ok(img)
}

/// Decode line art from a file to straight-alpha RGBA.  The format is taken
/// from the file contents, not the extension.
pub fn load_background_sync(path: &Path) -> Result<RgbaImage, AssetError> {
    let bytes = std::fs::read(path)?;
    let img = decode_background(&bytes)?;
    crate::log_info!("Loaded line art {} ({}×{})", path.display(), img.width(), img.height());
    Ok(img)
}

/// Decode line art from an in-memory encoded image.
pub fn decode_background(bytes: &[u8]) -> Result<RgbaImage, AssetError> {
    let img = image::load_from_memory(bytes)?.to_rgba8();
    ensure_not_empty(img, "line art")
}

/// A finished background decode.
pub struct LoadedBackground {
    pub token: u64,
    pub path: PathBuf,
    pub result: Result<RgbaImage, AssetError>,
}

/// Decodes line art off the UI thread.
///
/// Each `request` supersedes the previous one: completions are tagged with a
/// token and only the most recent request's result is ever returned by `poll`.
pub struct BackgroundLoader {
    sender: mpsc::Sender<LoadedBackground>,
    receiver: mpsc::Receiver<LoadedBackground>,
    latest_token: u64,
    pending: bool,
}

impl Default for BackgroundLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundLoader {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver, latest_token: 0, pending: false }
    }

    pub fn request(&mut self, path: PathBuf) -> u64 {
        self.latest_token += 1;
        self.pending = true;
        let token = self.latest_token;
        let sender = self.sender.clone();
        rayon::spawn(move || {
            let result = load_background_sync(&path);
            let _ = sender.send(LoadedBackground { token, path, result });
        });
        token
    }

    /// True while the latest request has not been delivered yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Drain finished decodes without blocking.  Stale completions are dropped.
    pub fn poll(&mut self) -> Option<LoadedBackground> {
        let mut latest = None;
        while let Ok(loaded) = self.receiver.try_recv() {
            if loaded.token == self.latest_token {
                self.pending = false;
                latest = Some(loaded);
            } else {
                crate::log_info!("Discarding stale load of {}", loaded.path.display());
            }
        }
        latest
    }
}

// ============================================================================
// EXPORT
// ============================================================================

/// How the flattened page is handed to the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportMode {
    /// Write the PNG to the chosen path.
    Download,
    /// Write to a temp file and open it in the system viewer for a manual save.
    Inline,
}

impl ExportMode {
    /// Platforms that block programmatic downloads get the inline mode.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "ios") { ExportMode::Inline } else { ExportMode::Download }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    Saved(PathBuf),
    OpenedInline(PathBuf),
}

/// Encode as PNG into memory.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, AssetError> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}

fn write_png(image: &RgbaImage, path: &Path) -> Result<(), AssetError> {
    let bytes = encode_png(image)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Export with the system viewer as the inline opener.
pub fn export_png(image: &RgbaImage, mode: ExportMode, dest: &Path) -> Result<ExportOutcome, AssetError> {
    export_png_with(image, mode, dest, |p| open::that(p))
}

/// Export `image` as PNG.  A failed download falls back to the inline path
/// instead of failing silently.
pub fn export_png_with<F>(
    image: &RgbaImage,
    mode: ExportMode,
    dest: &Path,
    open_inline: F,
) -> Result<ExportOutcome, AssetError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    if mode == ExportMode::Download {
        match write_png(image, dest) {
            Ok(()) => {
                crate::log_info!("Exported {}×{} page to {}", image.width(), image.height(), dest.display());
                return Ok(ExportOutcome::Saved(dest.to_path_buf()));
            }
            Err(e) => {
                crate::log_warn!("Export to {} failed ({}), opening inline instead", dest.display(), e);
            }
        }
    }

    let file_name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| crate::settings::DEFAULT_EXPORT_FILE_NAME.into());
    let inline_path = std::env::temp_dir().join(file_name);
    write_png(image, &inline_path)?;
    open_inline(&inline_path)?;
    crate::log_info!("Opened export inline: {}", inline_path.display());
    Ok(ExportOutcome::OpenedInline(inline_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn page() -> RgbaImage {
        let mut img = RgbaImage::from_pixel(6, 4, Rgba([255, 255, 255, 255]));
        img.put_pixel(2, 1, Rgba([255, 0, 0, 255]));
        img
    }

    #[test]
    fn download_writes_a_decodable_png() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("colored-image.png");
        let outcome = export_png_with(&page(), ExportMode::Download, &dest, |_| {
            panic!("inline opener must not run")
        })
        .unwrap();
        assert_eq!(outcome, ExportOutcome::Saved(dest.clone()));
        assert_eq!(load_background_sync(&dest).unwrap(), page());
    }

    #[test]
    fn failed_download_falls_back_to_inline() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("missing-dir").join("fallback-page.png");
        let mut opened = None;
        let outcome = export_png_with(&page(), ExportMode::Download, &dest, |p| {
            opened = Some(p.to_path_buf());
            Ok(())
        })
        .unwrap();
        let ExportOutcome::OpenedInline(path) = outcome else { panic!("expected inline") };
        assert_eq!(opened.as_deref(), Some(path.as_path()));
        assert!(path.ends_with("fallback-page.png"));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn in_memory_encoding_decodes_back() {
        let bytes = encode_png(&page()).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
        assert_eq!(decode_background(&bytes).unwrap(), page());
        assert!(matches!(decode_background(b"not an image"), Err(AssetError::Decode(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_background_sync(&dir.path().join("nope.png")).is_err());
    }

    #[test]
    fn loader_delivers_only_the_latest_request() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.png");
        let second = dir.path().join("second.png");
        RgbaImage::new(3, 3).save(&first).unwrap();
        page().save(&second).unwrap();

        let mut loader = BackgroundLoader::new();
        loader.request(first);
        let token = loader.request(second.clone());
        assert!(loader.is_pending());

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        let loaded = loop {
            if let Some(loaded) = loader.poll() {
                break loaded;
            }
            assert!(std::time::Instant::now() < deadline, "loader timed out");
            std::thread::sleep(std::time::Duration::from_millis(5));
        };
        assert_eq!(loaded.token, token);
        assert_eq!(loaded.path, second);
        assert_eq!(loaded.result.unwrap().dimensions(), (6, 4));
        assert!(!loader.is_pending());
    }
}
