pub mod heuristics;
pub mod probe;

use std::path::Path;

use crate::exec::ToolSet;
use probe::{FfmpegBanner, FfprobeJson, Probe, ProbedMeta};

/// Final display metadata for one file, every field filled best-effort.
#[derive(Debug, Clone)]
pub struct VideoMeta {
    /// `M:SS`, or `H:MM:SS` from one hour up
    pub duration: String,
    /// `<width>x<height>`
    pub resolution: String,
    /// Codec name, "unknown" when no probe reported one
    pub codec: String,
}

/// Probe with the best available strategy, then fill whatever is still
/// missing from filename/size heuristics. Never fails.
pub fn estimate(path: &Path, filename: &str, size_bytes: u64, tools: &ToolSet) -> VideoMeta {
    let probed = probe_with_tools(path, tools).unwrap_or_default();
    build_meta(probed, filename, size_bytes)
}

/// Duration in seconds for callers that need the raw value. Only
/// authoritative probes count here; heuristic estimates are not good
/// enough to drive bitrate math.
pub fn probe_duration_secs(path: &Path, tools: &ToolSet) -> Option<f64> {
    probe_with_tools(path, tools).and_then(|m| m.duration_secs)
}

/// Structured query first, diagnostic-text scraping second.
fn probe_with_tools(path: &Path, tools: &ToolSet) -> Option<ProbedMeta> {
    if let Some(ffprobe) = &tools.ffprobe {
        let prober = FfprobeJson {
            ffprobe: ffprobe.clone(),
        };
        if let Some(meta) = prober.probe(path) {
            return Some(meta);
        }
    }
    if let Some(ffmpeg) = &tools.ffmpeg {
        let prober = FfmpegBanner {
            ffmpeg: ffmpeg.clone(),
        };
        if let Some(meta) = prober.probe(path) {
            return Some(meta);
        }
    }
    None
}

fn build_meta(probed: ProbedMeta, filename: &str, size_bytes: u64) -> VideoMeta {
    let duration = match probed.duration_secs {
        Some(secs) => heuristics::format_duration(secs),
        None => heuristics::format_duration(heuristics::duration_from_size(size_bytes) as f64),
    };
    let (width, height) = probed
        .resolution
        .unwrap_or_else(|| heuristics::resolution_from_name(filename, size_bytes));

    VideoMeta {
        duration,
        resolution: format!("{}x{}", width, height),
        codec: probed.codec.unwrap_or_else(|| "unknown".to_string()),
    }
}
