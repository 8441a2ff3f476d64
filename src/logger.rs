//! Session log for ColorBook.
//!
//! One file per launch, overwritten each time, under the app data folder:
//!   Windows:  `%APPDATA%\ColorBook\colorbook.log`
//!   Linux:    `~/.local/share/ColorBook/colorbook.log`
//!   macOS:    `~/Library/Application Support/ColorBook/colorbook.log`
//!
//! Use the `log_info!` / `log_warn!` / `log_err!` macros anywhere in the crate.
//! Before `init()` runs (unit tests, library use) they are silent no-ops.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Folder name under the platform data directory.
pub const APP_DIR_NAME: &str = "ColorBook";

struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
}

static SESSION: OnceLock<SessionLog> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        }
    }
}

pub fn log_path() -> Option<&'static PathBuf> {
    SESSION.get().map(|s| &s.path)
}

fn append(args: fmt::Arguments<'_>) {
    let Some(session) = SESSION.get() else { return };
    if let Ok(mut file) = session.file.lock() {
        let _ = file.write_fmt(args);
        let _ = file.write_all(b"\n");
    }
}

/// Append a timestamped, level-tagged line.  I/O errors are swallowed.
pub fn write(level: Level, msg: fmt::Arguments<'_>) {
    if SESSION.get().is_some() {
        append(format_args!("[{}] [{}] {}", timestamp(), level.tag(), msg));
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Create (truncate) the session log and mirror panics into it.
/// `mode` is recorded in the header, e.g. "gui" or "cli".  Calling it twice is a no-op.
pub fn init(mode: &str) {
    if SESSION.get().is_some() {
        return;
    }
    let dir = app_data_dir();
    let path = dir.join("colorbook.log");
    let opened = std::fs::create_dir_all(&dir).and_then(|_| File::create(&path));
    let file = match opened {
        Ok(file) => file,
        Err(e) => {
            // Run without a log.
            eprintln!("[logger] cannot create {}: {}", path.display(), e);
            return;
        }
    };
    if SESSION.set(SessionLog { path: path.clone(), file: Mutex::new(file) }).is_err() {
        return;
    }

    append(format_args!(
        "=== ColorBook {} session, unix time {} ===",
        mode,
        unix_seconds().unwrap_or(0)
    ));
    append(format_args!("log: {}\n", path.display()));

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write(Level::Panic, format_args!("{}", info));
        default_hook(info);
    }));
}

/// `<platform data dir>/ColorBook`, shared with the settings file.
pub fn app_data_dir() -> PathBuf {
    platform_data_dir().join(APP_DIR_NAME)
}

fn platform_data_dir() -> PathBuf {
    let env_dir = |key: &str| std::env::var_os(key).filter(|v| !v.is_empty()).map(PathBuf::from);

    if cfg!(target_os = "windows")
        && let Some(dir) = env_dir("APPDATA")
    {
        return dir;
    }
    if cfg!(target_os = "macos")
        && let Some(home) = env_dir("HOME")
    {
        return home.join("Library/Application Support");
    }
    env_dir("XDG_DATA_HOME")
        .or_else(|| env_dir("HOME").map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_seconds() -> Option<u64> {
    SystemTime::now().duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// HH:MM:SS (UTC) within the current day.
fn timestamp() -> String {
    let Some(secs) = unix_seconds() else { return "--:--:--".to_string() };
    let day = secs % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, day % 3600 / 60, day % 60)
}
