use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::exec::{run_with_timeout, ToolSet};
use crate::media::bytes_to_mb;

/// Tunables for the target-size compressor. Every knob the retry loop
/// uses lives here; nothing is baked into the logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressOptions {
    pub videos_dir: PathBuf,
    /// Originals are moved here before being replaced.
    pub backup_dir: PathBuf,
    /// Files above this size get compressed.
    pub check_size_mb: f64,
    /// Hard ceiling for the re-encoded output.
    pub target_size_mb: f64,
    /// Audio bitrate reserved out of the size budget.
    pub audio_bitrate_kbps: u32,
    pub max_attempts: u32,
    /// Floor for the initial bitrate so degenerate inputs cannot produce
    /// a useless encode.
    pub min_bitrate_kbps: u32,
    /// Extra reduction applied on top of the measured overshoot ratio.
    pub safety_margin: f64,
    /// Decay used when an attempt failed without a measured output size.
    pub blind_decay: f64,
    pub pass1_timeout_secs: u64,
    pub pass2_timeout_secs: u64,
}

impl CompressOptions {
    /// Standard knobs; only the directories vary between setups.
    pub fn new(videos_dir: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            videos_dir,
            backup_dir,
            check_size_mb: 19.5,
            target_size_mb: 16.0,
            audio_bitrate_kbps: 128,
            max_attempts: 5,
            min_bitrate_kbps: 500,
            safety_margin: 0.95,
            blind_decay: 0.9,
            pass1_timeout_secs: 300,
            pass2_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("ffmpeg is not available")]
    ToolUnavailable,
    #[error("could not determine duration")]
    DurationUnavailable,
    #[error("analysis pass failed: {0}")]
    AnalyzeFailed(String),
    #[error("encode pass failed: {0}")]
    EncodeFailed(String),
    #[error("still {last_size_mb:.2} MB after {attempts} attempt(s), target {target_mb:.2} MB")]
    SizeTargetUnreachable {
        attempts: u32,
        last_size_mb: f64,
        target_mb: f64,
    },
    #[error("filesystem operation failed: {0}")]
    Filesystem(#[from] std::io::Error),
}

/// One pass of a two-pass encode. Pass 1 analyzes into the shared pass
/// log; pass 2 reads the log back and produces the output file.
pub trait EncodePass {
    fn analyze(&self, input: &Path, bitrate_kbps: u32, pass_log: &Path)
        -> Result<(), CompressError>;

    fn encode(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
        audio_bitrate_kbps: u32,
        pass_log: &Path,
    ) -> Result<(), CompressError>;
}

/// Two-pass libx264 encoding via the ffmpeg CLI.
pub struct FfmpegEncoder {
    pub ffmpeg: PathBuf,
    pub pass1_timeout: Duration,
    pub pass2_timeout: Duration,
}

impl EncodePass for FfmpegEncoder {
    fn analyze(
        &self,
        input: &Path,
        bitrate_kbps: u32,
        pass_log: &Path,
    ) -> Result<(), CompressError> {
        let null_sink = if cfg!(windows) { "NUL" } else { "/dev/null" };
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-b:v", &format!("{}k", bitrate_kbps)])
            .args(["-pass", "1"])
            .arg("-passlogfile")
            .arg(pass_log)
            .args(["-an", "-f", "null", "-y", null_sink]);

        let out = run_with_timeout(cmd, self.pass1_timeout)
            .map_err(|e| CompressError::AnalyzeFailed(e.to_string()))?;
        if !out.success() {
            return Err(CompressError::AnalyzeFailed(head(&out.stderr_lossy())));
        }
        Ok(())
    }

    fn encode(
        &self,
        input: &Path,
        output: &Path,
        bitrate_kbps: u32,
        audio_bitrate_kbps: u32,
        pass_log: &Path,
    ) -> Result<(), CompressError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.arg("-i")
            .arg(input)
            .args(["-c:v", "libx264", "-b:v", &format!("{}k", bitrate_kbps)])
            .args(["-pass", "2"])
            .arg("-passlogfile")
            .arg(pass_log)
            .args(["-c:a", "aac", "-b:a", &format!("{}k", audio_bitrate_kbps)])
            .args(["-movflags", "+faststart", "-y"])
            .arg(output);

        let out = run_with_timeout(cmd, self.pass2_timeout)
            .map_err(|e| CompressError::EncodeFailed(e.to_string()))?;
        if !out.success() {
            return Err(CompressError::EncodeFailed(head(&out.stderr_lossy())));
        }
        Ok(())
    }
}

/// First 200 characters of a tool's stderr, enough to identify the
/// failure without dumping the whole log into the report.
fn head(s: &str) -> String {
    let s = s.trim();
    let mut end = s.len().min(200);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Initial video bitrate for a target size, reserving audio headroom.
pub fn initial_bitrate_kbps(
    target_size_mb: f64,
    duration_secs: f64,
    audio_bitrate_kbps: u32,
    min_bitrate_kbps: u32,
) -> u32 {
    let raw = target_size_mb * 8.0 * 1024.0 / duration_secs - audio_bitrate_kbps as f64;
    (raw as i64).max(min_bitrate_kbps as i64) as u32
}

/// Bitrate for the next attempt after an overshoot. Scales by the
/// measured ratio and applies the safety margin; always lands strictly
/// below `current` so a retry can never re-attempt at the same rate.
pub fn next_bitrate_kbps(
    current: u32,
    measured_mb: Option<f64>,
    target_mb: f64,
    opts: &CompressOptions,
) -> u32 {
    let scaled = match measured_mb {
        Some(measured) if measured > 0.0 => {
            current as f64 / (measured / target_mb) * opts.safety_margin
        }
        _ => current as f64 * opts.blind_decay,
    };
    (scaled as u32).min(current.saturating_sub(1)).max(1)
}

/// One attempt of the retry loop, kept for reporting only.
#[derive(Debug, Clone, Serialize)]
pub struct CompressionAttempt {
    pub attempt: u32,
    pub bitrate_kbps: u32,
    pub output_size_mb: f64,
}

/// Successful compression of one file.
#[derive(Debug)]
pub struct Compressed {
    pub final_size_mb: f64,
    pub backup_path: PathBuf,
    pub attempts: Vec<CompressionAttempt>,
}

/// Removes a file on drop unless `keep` was called.
struct TempGuard {
    path: PathBuf,
    keep: bool,
}

impl TempGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for TempGuard {
    fn drop(&mut self) {
        if !self.keep && self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

/// Removes the two-pass analysis side files on drop.
struct PassLogGuard {
    base: PathBuf,
}

impl Drop for PassLogGuard {
    fn drop(&mut self) {
        for suffix in ["-0.log", "-0.log.mbtree"] {
            let mut name = self.base.as_os_str().to_os_string();
            name.push(suffix);
            let path = PathBuf::from(name);
            if path.exists() {
                let _ = fs::remove_file(&path);
            }
        }
    }
}

pub struct Compressor<'a, E: EncodePass> {
    opts: &'a CompressOptions,
    encoder: &'a E,
}

impl<'a, E: EncodePass> Compressor<'a, E> {
    pub fn new(opts: &'a CompressOptions, encoder: &'a E) -> Self {
        Self { opts, encoder }
    }

    /// Re-encode `input` until it fits under the target size, then swap
    /// the compressed file into place and move the original to the backup
    /// directory. On any failure the original is left untouched and no
    /// transient file survives.
    pub fn compress(&self, input: &Path, duration_secs: f64) -> Result<Compressed, CompressError> {
        if duration_secs <= 0.0 {
            return Err(CompressError::DurationUnavailable);
        }

        let opts = self.opts;
        let parent = input.parent().unwrap_or(Path::new("."));
        let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("video");
        let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("mp4");
        let temp_output = parent.join(format!("{}_compressed.{}", stem, ext));
        let pass_log = parent.join("ffmpeg2pass");

        let mut bitrate = initial_bitrate_kbps(
            opts.target_size_mb,
            duration_secs,
            opts.audio_bitrate_kbps,
            opts.min_bitrate_kbps,
        );
        let mut attempts: Vec<CompressionAttempt> = Vec::new();
        let mut last_size_mb: Option<f64> = None;

        for attempt in 1..=opts.max_attempts {
            if attempt > 1 {
                bitrate = next_bitrate_kbps(bitrate, last_size_mb, opts.target_size_mb, opts);
            }

            let temp = TempGuard::new(temp_output.clone());
            let _pass_logs = PassLogGuard {
                base: pass_log.clone(),
            };

            self.encoder.analyze(input, bitrate, &pass_log)?;
            self.encoder.encode(
                input,
                &temp_output,
                bitrate,
                opts.audio_bitrate_kbps,
                &pass_log,
            )?;

            let size = fs::metadata(&temp_output).map(|m| m.len()).unwrap_or(0);
            if size == 0 {
                return Err(CompressError::EncodeFailed(
                    "output file missing or empty".into(),
                ));
            }
            let size_mb = bytes_to_mb(size);
            attempts.push(CompressionAttempt {
                attempt,
                bitrate_kbps: bitrate,
                output_size_mb: size_mb,
            });

            if size_mb <= opts.target_size_mb {
                let backup_path = self.swap_into_place(input, &temp_output)?;
                temp.keep();
                return Ok(Compressed {
                    final_size_mb: size_mb,
                    backup_path,
                    attempts,
                });
            }

            last_size_mb = Some(size_mb);
            // guards drop here, next attempt starts clean
        }

        Err(CompressError::SizeTargetUnreachable {
            attempts: opts.max_attempts,
            last_size_mb: last_size_mb.unwrap_or(0.0),
            target_mb: opts.target_size_mb,
        })
    }

    /// Move the original into the backup directory (timestamp-suffixed on
    /// a name collision), then the compressed file into the original's
    /// place. If the second move fails the original is restored first, so
    /// the original path never ends up empty.
    fn swap_into_place(&self, input: &Path, temp_output: &Path) -> Result<PathBuf, CompressError> {
        fs::create_dir_all(&self.opts.backup_dir)?;

        let filename = input.file_name().and_then(|n| n.to_str()).unwrap_or("video");
        let mut backup_path = self.opts.backup_dir.join(filename);
        if backup_path.exists() {
            let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("video");
            let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("mp4");
            backup_path = self
                .opts
                .backup_dir
                .join(format!("{}_{}.{}", stem, stamp, ext));
        }

        fs::rename(input, &backup_path)?;
        if let Err(e) = fs::rename(temp_output, input) {
            let _ = fs::rename(&backup_path, input);
            return Err(CompressError::Filesystem(e));
        }
        Ok(backup_path)
    }
}

/// Probe the duration and run the compressor with the real encoder.
pub fn compress_file(
    input: &Path,
    opts: &CompressOptions,
    tools: &ToolSet,
) -> Result<Compressed, CompressError> {
    let Some(ffmpeg) = tools.ffmpeg.clone() else {
        return Err(CompressError::ToolUnavailable);
    };
    let duration_secs =
        crate::meta::probe_duration_secs(input, tools).ok_or(CompressError::DurationUnavailable)?;

    let encoder = FfmpegEncoder {
        ffmpeg,
        pass1_timeout: Duration::from_secs(opts.pass1_timeout_secs),
        pass2_timeout: Duration::from_secs(opts.pass2_timeout_secs),
    };
    Compressor::new(opts, &encoder).compress(input, duration_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::tempdir;

    fn test_opts(dir: &Path) -> CompressOptions {
        let mut opts =
            CompressOptions::new(dir.join("videos"), dir.join("backup"));
        opts.target_size_mb = 0.5;
        opts
    }

    fn side_file(pass_log: &Path) -> PathBuf {
        let mut name = pass_log.as_os_str().to_os_string();
        name.push("-0.log");
        PathBuf::from(name)
    }

    fn write_mb(path: &Path, mb: f64) {
        fs::write(path, vec![0u8; (mb * 1024.0 * 1024.0) as usize]).unwrap();
    }

    /// Always produces an output `ratio` times the target size.
    struct OvershootEncoder {
        ratio: f64,
        target_mb: f64,
        bitrates: RefCell<Vec<u32>>,
    }

    impl EncodePass for OvershootEncoder {
        fn analyze(&self, _: &Path, _: u32, pass_log: &Path) -> Result<(), CompressError> {
            fs::write(side_file(pass_log), b"stats").unwrap();
            Ok(())
        }

        fn encode(
            &self,
            _: &Path,
            output: &Path,
            bitrate_kbps: u32,
            _: u32,
            _: &Path,
        ) -> Result<(), CompressError> {
            self.bitrates.borrow_mut().push(bitrate_kbps);
            write_mb(output, self.target_mb * self.ratio);
            Ok(())
        }
    }

    /// Output size proportional to the requested bitrate.
    struct ProportionalEncoder {
        duration_secs: f64,
    }

    impl EncodePass for ProportionalEncoder {
        fn analyze(&self, _: &Path, _: u32, pass_log: &Path) -> Result<(), CompressError> {
            fs::write(side_file(pass_log), b"stats").unwrap();
            Ok(())
        }

        fn encode(
            &self,
            _: &Path,
            output: &Path,
            bitrate_kbps: u32,
            _: u32,
            _: &Path,
        ) -> Result<(), CompressError> {
            let size_mb = bitrate_kbps as f64 * self.duration_secs / (8.0 * 1024.0);
            write_mb(output, size_mb);
            Ok(())
        }
    }

    struct FailingEncoder;

    impl EncodePass for FailingEncoder {
        fn analyze(&self, _: &Path, _: u32, pass_log: &Path) -> Result<(), CompressError> {
            fs::write(side_file(pass_log), b"stats").unwrap();
            Ok(())
        }

        fn encode(&self, _: &Path, _: &Path, _: u32, _: u32, _: &Path) -> Result<(), CompressError> {
            Err(CompressError::EncodeFailed("simulated crash".into()))
        }
    }

    fn setup_input(dir: &Path) -> PathBuf {
        let videos = dir.join("videos");
        fs::create_dir_all(&videos).unwrap();
        let input = videos.join("big_clip.mp4");
        fs::write(&input, b"original bytes, definitely a video").unwrap();
        input
    }

    fn leftovers(videos: &Path) -> Vec<String> {
        fs::read_dir(videos)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n != "big_clip.mp4")
            .collect()
    }

    #[test]
    fn test_initial_bitrate_floor() {
        // Naive formula would go negative here.
        assert_eq!(initial_bitrate_kbps(1.0, 10_000.0, 128, 500), 500);
        // And stays floored when merely small.
        assert_eq!(initial_bitrate_kbps(0.5, 600.0, 128, 500), 500);
        for target in [0.1, 1.0, 16.0, 100.0] {
            for duration in [0.5, 10.0, 600.0, 86_400.0] {
                assert!(initial_bitrate_kbps(target, duration, 128, 500) >= 500);
            }
        }
        // Sanity: 16 MB over 60s leaves ~2056 kbps for video.
        assert_eq!(initial_bitrate_kbps(16.0, 60.0, 128, 500), 2056);
    }

    #[test]
    fn test_next_bitrate_strictly_decreases() {
        let opts = CompressOptions::new(PathBuf::new(), PathBuf::new());
        let mut bitrate = 2000;
        for _ in 0..10 {
            let next = next_bitrate_kbps(bitrate, Some(20.0), 16.0, &opts);
            assert!(next < bitrate);
            bitrate = next;
        }
        // Even a bogus measured size barely above target must decrease.
        assert!(next_bitrate_kbps(1000, Some(16.000001), 16.0, &opts) < 1000);
        // No measured size: blind decay.
        assert_eq!(next_bitrate_kbps(1000, None, 16.0, &opts), 900);
    }

    #[test]
    fn test_overshoot_exhausts_budget_and_restores_state() {
        let dir = tempdir().unwrap();
        let input = setup_input(dir.path());
        let original = fs::read(&input).unwrap();
        let opts = test_opts(dir.path());

        let encoder = OvershootEncoder {
            ratio: 1.5,
            target_mb: opts.target_size_mb,
            bitrates: RefCell::new(Vec::new()),
        };
        let result = Compressor::new(&opts, &encoder).compress(&input, 60.0);

        assert!(matches!(
            result,
            Err(CompressError::SizeTargetUnreachable { attempts: 5, .. })
        ));

        let bitrates = encoder.bitrates.borrow();
        assert_eq!(bitrates.len(), opts.max_attempts as usize);
        for pair in bitrates.windows(2) {
            assert!(pair[1] < pair[0]);
        }

        // Original untouched, no temp/backup/pass-log residue.
        assert_eq!(fs::read(&input).unwrap(), original);
        assert!(leftovers(&dir.path().join("videos")).is_empty());
        assert!(!opts.backup_dir.exists());
    }

    #[test]
    fn test_success_swaps_and_backs_up() {
        let dir = tempdir().unwrap();
        let input = setup_input(dir.path());
        let original = fs::read(&input).unwrap();
        let opts = test_opts(dir.path());

        // 60s at the 500 kbps floor overshoots 0.5 MB, so the first
        // attempt fails and the second lands under the target.
        let encoder = ProportionalEncoder { duration_secs: 60.0 };
        let done = Compressor::new(&opts, &encoder)
            .compress(&input, 60.0)
            .unwrap();

        assert_eq!(done.attempts.len(), 2);
        assert!(done.final_size_mb <= opts.target_size_mb);

        // Backup holds the original bytes; the original path holds the
        // smaller encode; nothing else remains.
        assert_eq!(fs::read(&done.backup_path).unwrap(), original);
        let replaced = fs::metadata(&input).unwrap().len();
        assert!(replaced > 0 && (replaced as usize) < original.len().max(1024 * 1024));
        assert_eq!(bytes_to_mb(replaced), done.final_size_mb);
        assert!(leftovers(&dir.path().join("videos")).is_empty());
    }

    #[test]
    fn test_backup_collision_gets_timestamp_suffix() {
        let dir = tempdir().unwrap();
        let input = setup_input(dir.path());
        let opts = test_opts(dir.path());

        fs::create_dir_all(&opts.backup_dir).unwrap();
        fs::write(opts.backup_dir.join("big_clip.mp4"), b"older backup").unwrap();

        let encoder = ProportionalEncoder { duration_secs: 60.0 };
        let done = Compressor::new(&opts, &encoder)
            .compress(&input, 60.0)
            .unwrap();

        assert_ne!(done.backup_path, opts.backup_dir.join("big_clip.mp4"));
        assert_eq!(fs::read_dir(&opts.backup_dir).unwrap().count(), 2);
    }

    #[test]
    fn test_encode_failure_leaves_original() {
        let dir = tempdir().unwrap();
        let input = setup_input(dir.path());
        let original = fs::read(&input).unwrap();
        let opts = test_opts(dir.path());

        let result = Compressor::new(&opts, &FailingEncoder).compress(&input, 60.0);
        assert!(matches!(result, Err(CompressError::EncodeFailed(_))));
        assert_eq!(fs::read(&input).unwrap(), original);
        assert!(leftovers(&dir.path().join("videos")).is_empty());
    }

    #[test]
    fn test_unknown_duration_fails_without_writing() {
        let dir = tempdir().unwrap();
        let input = setup_input(dir.path());
        let opts = test_opts(dir.path());

        let encoder = ProportionalEncoder { duration_secs: 60.0 };
        let result = Compressor::new(&opts, &encoder).compress(&input, 0.0);
        assert!(matches!(result, Err(CompressError::DurationUnavailable)));
        assert!(leftovers(&dir.path().join("videos")).is_empty());
    }
}
