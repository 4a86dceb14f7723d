use crate::media::bytes_to_mb;

/// Assumed encoding rate for the size-based duration model: 0.25 MB per
/// second of footage (2 Mbps).
const ASSUMED_MB_PER_SEC: f64 = 0.25;

/// Cap on heuristic duration estimates; very large files would otherwise
/// produce absurd numbers.
const MAX_ESTIMATED_SECS: u64 = 3600;

/// Resolution keywords, checked in order. The broad "hd" token comes last
/// so it cannot swallow "uhd" or "fullhd".
const RESOLUTION_KEYWORDS: &[(&[&str], (u32, u32))] = &[
    (&["4k", "2160p", "uhd"], (3840, 2160)),
    (&["2k", "1440p"], (2560, 1440)),
    (&["1080p", "fullhd"], (1920, 1080)),
    (&["720p", "hd"], (1280, 720)),
];

/// Estimate a duration in whole seconds from file size alone.
pub fn duration_from_size(size_bytes: u64) -> u64 {
    let secs = (bytes_to_mb(size_bytes) / ASSUMED_MB_PER_SEC) as u64;
    secs.min(MAX_ESTIMATED_SECS)
}

/// Guess a resolution from filename keywords, falling back to size bands.
pub fn resolution_from_name(filename: &str, size_bytes: u64) -> (u32, u32) {
    let lower = filename.to_lowercase();
    for (tokens, resolution) in RESOLUTION_KEYWORDS {
        if tokens.iter().any(|t| lower.contains(t)) {
            return *resolution;
        }
    }

    let size_mb = bytes_to_mb(size_bytes);
    if size_mb > 50.0 {
        (1920, 1080)
    } else if size_mb > 20.0 {
        (1280, 720)
    } else {
        (854, 480)
    }
}

/// Render seconds as `M:SS`, or `H:MM:SS` from one hour up. Fractional
/// seconds are truncated, not rounded.
pub fn format_duration(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}
