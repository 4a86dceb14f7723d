use std::path::{Path, PathBuf};

/// File extensions treated as video content (matched case-insensitively).
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv", "webm"];

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct VideoFile {
    /// Full path to the file
    pub path: PathBuf,
    /// Just the filename
    pub filename: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoFile {
    pub fn new(path: PathBuf, filename: String, size: u64) -> Self {
        Self {
            path,
            filename,
            size,
        }
    }

    /// File size in megabytes.
    pub fn size_mb(&self) -> f64 {
        bytes_to_mb(self.size)
    }

    /// Filename without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.filename)
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Check a path against the video extension allowlist.
pub fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |ext| {
            VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v))
        })
}
