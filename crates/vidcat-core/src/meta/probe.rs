use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::exec::run_with_timeout;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Best-effort technical metadata for one file. Fields are independent;
/// any of them may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbedMeta {
    pub duration_secs: Option<f64>,
    pub resolution: Option<(u32, u32)>,
    pub codec: Option<String>,
}

impl ProbedMeta {
    pub fn is_empty(&self) -> bool {
        self.duration_secs.is_none() && self.resolution.is_none()
    }
}

/// A probing strategy. Implementations may fail per file; callers fall
/// back to heuristics for whatever stays `None`.
pub trait Probe {
    fn probe(&self, path: &Path) -> Option<ProbedMeta>;
}

/// Structured probe: ffprobe's JSON output mode.
pub struct FfprobeJson {
    pub ffprobe: PathBuf,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl Probe for FfprobeJson {
    fn probe(&self, path: &Path) -> Option<ProbedMeta> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path);

        let out = run_with_timeout(cmd, PROBE_TIMEOUT).ok()?;
        if !out.success() {
            return None;
        }
        let parsed: FfprobeOutput = serde_json::from_slice(&out.stdout).ok()?;

        let duration_secs = parsed
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| *d > 0.0);
        let video = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"));
        let resolution = video
            .and_then(|s| Some((s.width?, s.height?)))
            .filter(|(w, h)| *w > 0 && *h > 0);
        let codec = video.and_then(|s| s.codec_name.clone());

        Some(ProbedMeta {
            duration_secs,
            resolution,
            codec,
        })
    }
}

/// Fallback probe: scrape the banner ffmpeg prints on stderr when invoked
/// with an input and no output.
pub struct FfmpegBanner {
    pub ffmpeg: PathBuf,
}

impl Probe for FfmpegBanner {
    fn probe(&self, path: &Path) -> Option<ProbedMeta> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i").arg(path);

        // ffmpeg exits non-zero without an output file; the banner is
        // printed regardless, so only spawn/timeout failures matter.
        let out = run_with_timeout(cmd, PROBE_TIMEOUT).ok()?;
        let meta = parse_diagnostics(&out.stderr_lossy());
        if meta.is_empty() {
            None
        } else {
            Some(meta)
        }
    }
}

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap());
static CODEC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Video:\s*(\w+)").unwrap());
// At least two digits on each side, so hex tags like `0x31637661` in the
// stream description never match.
static RESOLUTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2,5})x(\d{2,5})").unwrap());

/// Extract duration/resolution/codec markers from a diagnostic stream.
/// Markers are matched independently; absent ones stay `None`.
pub fn parse_diagnostics(text: &str) -> ProbedMeta {
    let mut meta = ProbedMeta::default();

    for line in text.lines() {
        if meta.duration_secs.is_none() {
            if let Some(caps) = DURATION_RE.captures(line) {
                let hours: f64 = caps[1].parse().unwrap_or(0.0);
                let minutes: f64 = caps[2].parse().unwrap_or(0.0);
                let seconds: f64 = caps[3].parse().unwrap_or(0.0);
                let total = hours * 3600.0 + minutes * 60.0 + seconds;
                if total > 0.0 {
                    meta.duration_secs = Some(total);
                }
            }
        }
        if line.contains("Video:") {
            if meta.codec.is_none() {
                if let Some(caps) = CODEC_RE.captures(line) {
                    meta.codec = Some(caps[1].to_string());
                }
            }
            if meta.resolution.is_none() {
                if let Some(caps) = RESOLUTION_RE.captures(line) {
                    let width: u32 = caps[1].parse().unwrap_or(0);
                    let height: u32 = caps[2].parse().unwrap_or(0);
                    if width > 0 && height > 0 {
                        meta.resolution = Some((width, height));
                    }
                }
            }
        }
    }

    meta
}
