use std::env;
use std::path::{Path, PathBuf};

#[cfg(windows)]
const TESSERACT_BINARY: &str = "tesseract.exe";
#[cfg(not(windows))]
const TESSERACT_BINARY: &str = "tesseract";

/// Common installation paths checked after PATH.
#[cfg(windows)]
const COMMON_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];
#[cfg(not(windows))]
const COMMON_PATHS: &[&str] = &[
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

/// Locates the Tesseract executable.
///
/// An explicit configured path wins when it exists; otherwise PATH and a few
/// common install locations are searched. Returns `None` when Tesseract is
/// not installed, in which case the Tesseract engines report unavailable.
pub fn find_tesseract(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() {
            log::info!("Tesseract found at configured path: {}", path.display());
            return Some(path.to_path_buf());
        }
        log::warn!("Configured Tesseract path does not exist: {}", path.display());
    }

    if let Some(paths) = env::var_os("PATH") {
        for dir in env::split_paths(&paths) {
            let candidate = dir.join(TESSERACT_BINARY);
            if candidate.is_file() {
                log::info!("Tesseract found in PATH: {}", candidate.display());
                return Some(candidate);
            }
        }
    }

    for path in COMMON_PATHS {
        let candidate = PathBuf::from(path);
        if candidate.is_file() {
            log::info!("Tesseract found at: {}", candidate.display());
            return Some(candidate);
        }
    }

    log::warn!("Tesseract not found; OCR will run without Tesseract engines");
    None
}
