use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::exec::{run_with_timeout, ToolSet};
use crate::media::VideoFile;

const THUMB_TIMEOUT: Duration = Duration::from_secs(30);

/// Seek points tried in order; the very first frames of some files are
/// black or not yet decodable.
const SEEK_POINTS: &[&str] = &["00:00:01", "00:00:03", "00:00:05", "00:00:10"];

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailKind {
    Jpg,
    Svg,
}

impl ThumbnailKind {
    pub fn label(&self) -> &'static str {
        match self {
            ThumbnailKind::Jpg => "JPG",
            ThumbnailKind::Svg => "SVG",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Thumbnail {
    pub filename: String,
    pub kind: ThumbnailKind,
}

/// Produce a thumbnail for one video: a real frame when the encoder tool
/// cooperates, an SVG placeholder otherwise.
pub fn generate(
    video: &VideoFile,
    thumbnails_dir: &Path,
    title: &str,
    tools: &ToolSet,
) -> Option<Thumbnail> {
    if let Some(ffmpeg) = &tools.ffmpeg {
        if let Some(thumb) = extract_frame(ffmpeg, &video.path, video.stem(), thumbnails_dir) {
            return Some(thumb);
        }
    }
    svg_placeholder(video, thumbnails_dir, title)
}

fn extract_frame(
    ffmpeg: &Path,
    video: &Path,
    stem: &str,
    thumbnails_dir: &Path,
) -> Option<Thumbnail> {
    let filename = format!("{}.jpg", stem);
    let out_path = thumbnails_dir.join(&filename);

    for point in SEEK_POINTS {
        let mut cmd = Command::new(ffmpeg);
        cmd.arg("-i")
            .arg(video)
            .args(["-ss", point, "-vframes", "1", "-q:v", "2", "-f", "image2", "-y"])
            .arg(&out_path);

        let Ok(out) = run_with_timeout(cmd, THUMB_TIMEOUT) else {
            continue;
        };
        if !out.success() {
            continue;
        }
        if is_valid_jpeg(&out_path) {
            return Some(Thumbnail {
                filename,
                kind: ThumbnailKind::Jpg,
            });
        }
        // zero-length or not a JPEG; discard and try a later frame
        let _ = fs::remove_file(&out_path);
    }
    None
}

fn is_valid_jpeg(path: &Path) -> bool {
    fs::read(path).map_or(false, |bytes| {
        bytes.len() > JPEG_MAGIC.len() && bytes.starts_with(JPEG_MAGIC)
    })
}

/// Background, accent, and caption colors banded by file size.
fn color_scheme(size_mb: f64) -> (&'static str, &'static str, &'static str) {
    if size_mb > 50.0 {
        ("#4C1D95", "#8B5CF6", "#C4B5FD")
    } else if size_mb > 20.0 {
        ("#065F46", "#10B981", "#6EE7B7")
    } else {
        ("#1E40AF", "#3B82F6", "#93C5FD")
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn svg_placeholder(video: &VideoFile, thumbnails_dir: &Path, title: &str) -> Option<Thumbnail> {
    let filename = format!("{}.svg", video.stem());
    let path = thumbnails_dir.join(&filename);

    let (bg, primary, secondary) = color_scheme(video.size_mb());
    let ext = video
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_uppercase();

    let svg = format!(
        r##"<svg width="320" height="180" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <linearGradient id="bgGradient" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" style="stop-color:{bg};stop-opacity:1" />
      <stop offset="100%" style="stop-color:#1F2937;stop-opacity:1" />
    </linearGradient>
  </defs>
  <rect width="100%" height="100%" fill="url(#bgGradient)" rx="8" ry="8"/>
  <g transform="translate(160, 70)">
    <circle r="28" fill="{primary}" fill-opacity="0.9"/>
    <polygon points="-8,-10 -8,10 12,0" fill="#FFFFFF"/>
  </g>
  <g transform="translate(160, 120)">
    <text text-anchor="middle" fill="#F9FAFB" font-family="Arial, sans-serif" font-size="14" font-weight="bold">
      {title}
    </text>
    <text y="20" text-anchor="middle" fill="{secondary}" font-family="Arial, sans-serif" font-size="11">
      {ext} &#8226; {size:.1} MB
    </text>
  </g>
</svg>"##,
        bg = bg,
        primary = primary,
        secondary = secondary,
        title = xml_escape(title),
        ext = ext,
        size = video.size_mb(),
    );

    fs::write(&path, svg).ok()?;
    Some(Thumbnail {
        filename,
        kind: ThumbnailKind::Svg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_svg_placeholder_contents() {
        let dir = tempdir().unwrap();
        let video = VideoFile::new(
            dir.path().join("cats & dogs.mp4"),
            "cats & dogs.mp4".into(),
            30 * 1024 * 1024,
        );

        let thumb = svg_placeholder(&video, dir.path(), "Cats & Dogs").unwrap();
        assert_eq!(thumb.kind, ThumbnailKind::Svg);
        assert_eq!(thumb.filename, "cats & dogs.svg");

        let svg = fs::read_to_string(dir.path().join(&thumb.filename)).unwrap();
        assert!(svg.contains("Cats &amp; Dogs"));
        assert!(svg.contains("MP4"));
        assert!(svg.contains("30.0 MB"));
        // 30 MB lands in the middle color band
        assert!(svg.contains("#065F46"));
    }

    #[test]
    fn test_color_bands() {
        assert_eq!(color_scheme(80.0).0, "#4C1D95");
        assert_eq!(color_scheme(30.0).0, "#065F46");
        assert_eq!(color_scheme(5.0).0, "#1E40AF");
    }

    #[test]
    fn test_jpeg_validation() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.jpg");
        fs::write(&good, [0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        assert!(is_valid_jpeg(&good));

        let bad = dir.path().join("bad.jpg");
        fs::write(&bad, b"<html>not found</html>").unwrap();
        assert!(!is_valid_jpeg(&bad));

        let empty = dir.path().join("empty.jpg");
        fs::write(&empty, b"").unwrap();
        assert!(!is_valid_jpeg(&empty));
        assert!(!is_valid_jpeg(&dir.path().join("absent.jpg")));
    }

    #[test]
    fn test_generate_without_tools_yields_svg() {
        let dir = tempdir().unwrap();
        let video = VideoFile::new(dir.path().join("demo.mp4"), "demo.mp4".into(), 1024);
        let thumb = generate(&video, dir.path(), "Demo", &ToolSet::default()).unwrap();
        assert_eq!(thumb.kind, ThumbnailKind::Svg);
        assert!(dir.path().join("demo.svg").exists());
    }
}
