pub mod compress;
pub mod exec;
pub mod manifest;
pub mod media;
pub mod meta;
pub mod scan;
pub mod thumbs;

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use compress::{CompressError, CompressOptions, Compressed, CompressionAttempt};
pub use exec::ToolSet;

/// Options for the catalog update pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOptions {
    pub videos_dir: PathBuf,
    pub thumbnails_dir: PathBuf,
    /// Directory the manifest and index files are written to.
    pub output_dir: PathBuf,
    pub cdn: manifest::CdnConfig,
    /// Page size recorded in the pagination block.
    pub page_size: u32,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter — emits at most every 200ms, plus the
/// completing report of each stage.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: Mutex::new(Instant::now() - Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let mut last = self.last_emit.lock().unwrap();
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Summary of one update run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateReport {
    pub total_videos: u64,
    pub jpg_thumbnails: u64,
    pub svg_thumbnails: u64,
    pub data_file: String,
    pub manifest_path: PathBuf,
    pub index_path: PathBuf,
}

/// Outcome for a single file in the compression batch.
#[derive(Debug)]
pub enum FileOutcome {
    /// Already at or under the check threshold.
    Compliant { size_mb: f64 },
    Compressed {
        from_mb: f64,
        to_mb: f64,
        attempts: u32,
        backup_path: PathBuf,
    },
    Failed { reason: String },
}

/// Summary of one compression run. Failures are file-scoped: the batch
/// always runs to the end.
#[derive(Debug, Default)]
pub struct CompressReport {
    pub outcomes: Vec<(String, FileOutcome)>,
    pub compressed: u64,
    pub skipped: u64,
    pub failed: u64,
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Run the full update pipeline: scan, probe, thumbnail, manifest.
pub fn update(options: &UpdateOptions, progress: &ProgressCallback) -> anyhow::Result<UpdateReport> {
    let tools = ToolSet::detect();
    update_with_tools(options, &tools, progress)
}

pub fn update_with_tools(
    options: &UpdateOptions,
    tools: &ToolSet,
    progress: &ProgressCallback,
) -> anyhow::Result<UpdateReport> {
    let tp = ThrottledProgress::new(progress);

    // Stage 1: Scan
    let files = scan::scan_videos(&options.videos_dir)?;
    if files.is_empty() {
        anyhow::bail!("no video files found in {}", options.videos_dir.display());
    }
    let total = files.len() as u64;
    tp.report("scan", total, total, &format!("Found {} video file(s)", total));

    fs::create_dir_all(&options.thumbnails_dir)?;
    fs::create_dir_all(&options.output_dir)?;

    let timestamp = unix_timestamp();
    let created_at = manifest::today();

    // Stage 2: Per-file metadata and thumbnails. Files share no mutable
    // state, so this stage fans out; the manifest is assembled only after
    // every file is done.
    let counter = AtomicU64::new(0);
    let details: Vec<(meta::VideoMeta, Option<thumbs::Thumbnail>, String)> = files
        .par_iter()
        .map(|file| {
            let title = manifest::friendly_title(file.stem());
            let video_meta = meta::estimate(&file.path, &file.filename, file.size, tools);
            let thumb = thumbs::generate(file, &options.thumbnails_dir, &title, tools);
            let current = counter.fetch_add(1, Ordering::Relaxed);
            tp.report("meta", current, total, &file.filename);
            (video_meta, thumb, title)
        })
        .collect();

    // Stage 3: Assemble entries and write the data file + index
    let mut entries = Vec::with_capacity(files.len());
    let mut jpg_thumbnails = 0u64;
    let mut svg_thumbnails = 0u64;
    for (i, (file, (video_meta, thumb, title))) in files.iter().zip(details).enumerate() {
        let (thumbnail, thumbnail_type) = match &thumb {
            Some(t) => {
                match t.kind {
                    thumbs::ThumbnailKind::Jpg => jpg_thumbnails += 1,
                    thumbs::ThumbnailKind::Svg => svg_thumbnails += 1,
                }
                (options.cdn.thumbnail_url(&t.filename), t.kind.label().to_string())
            }
            None => (String::new(), "NONE".to_string()),
        };

        entries.push(manifest::CatalogEntry {
            id: (i + 1) as u32,
            description: manifest::description_for(&title),
            title,
            filename: file.filename.clone(),
            url: options.cdn.video_url(&file.filename),
            duration: video_meta.duration,
            size: format!("{:.1} MB", file.size_mb()),
            thumbnail,
            codec: video_meta.codec,
            resolution: video_meta.resolution,
            created_at: created_at.clone(),
            thumbnail_type,
            timestamp,
        });
    }

    let data_file = manifest::data_filename(timestamp);
    let last_updated = manifest::now_iso_utc();
    let full = manifest::Manifest {
        pagination: manifest::Pagination::single_page(entries.len() as u32, options.page_size),
        videos: entries,
        last_updated: last_updated.clone(),
        timestamp,
        filename: data_file.clone(),
        repository: options.cdn.repository.clone(),
        ffmpeg_available: tools.ffmpeg_available(),
    };
    let manifest_path = options.output_dir.join(&data_file);
    manifest::write_json_atomic(&manifest_path, &full)?;

    let index = manifest::CatalogIndex {
        latest: data_file.clone(),
        timestamp,
        last_updated,
        data_url: options.cdn.data_url(&data_file),
    };
    let index_path = options.output_dir.join("videos.json");
    manifest::write_json_atomic(&index_path, &index)?;
    tp.report("write", total, total, "Manifest written");

    Ok(UpdateReport {
        total_videos: total,
        jpg_thumbnails,
        svg_thumbnails,
        data_file,
        manifest_path,
        index_path,
    })
}

/// Run the compression pass: every file above the check threshold is
/// re-encoded down to the target size.
pub fn compress_batch(
    options: &CompressOptions,
    progress: &ProgressCallback,
) -> anyhow::Result<CompressReport> {
    let tools = ToolSet::detect();
    compress_batch_with_tools(options, &tools, progress)
}

pub fn compress_batch_with_tools(
    options: &CompressOptions,
    tools: &ToolSet,
    progress: &ProgressCallback,
) -> anyhow::Result<CompressReport> {
    let tp = ThrottledProgress::new(progress);
    let files = scan::scan_videos(&options.videos_dir)?;
    let total = files.len() as u64;
    let mut report = CompressReport::default();

    // One file start to finish before the next; retries for a single file
    // must never run concurrently.
    for (i, file) in files.iter().enumerate() {
        tp.report("compress", i as u64, total, &file.filename);
        let size_mb = file.size_mb();
        let outcome = if size_mb <= options.check_size_mb {
            report.skipped += 1;
            FileOutcome::Compliant { size_mb }
        } else {
            match compress::compress_file(&file.path, options, tools) {
                Ok(done) => {
                    report.compressed += 1;
                    FileOutcome::Compressed {
                        from_mb: size_mb,
                        to_mb: done.final_size_mb,
                        attempts: done.attempts.len() as u32,
                        backup_path: done.backup_path,
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    FileOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            }
        };
        report.outcomes.push((file.filename.clone(), outcome));
    }
    tp.report("compress", total, total, "Compression pass complete");

    Ok(report)
}
