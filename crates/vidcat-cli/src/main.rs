use std::path::PathBuf;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use vidcat_core::manifest::CdnConfig;
use vidcat_core::{CompressOptions, FileOutcome, UpdateOptions};

#[derive(Parser)]
#[command(
    name = "vidcat",
    version,
    about = "Maintain a CDN-hosted video catalog: compress oversized files and publish a JSON manifest"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the videos folder and regenerate the manifest and index
    Update {
        /// Videos folder
        #[arg(long, default_value = "videos")]
        videos_dir: PathBuf,

        /// Thumbnails output folder
        #[arg(long, default_value = "thumbnails")]
        thumbnails_dir: PathBuf,

        /// Where the manifest and index JSON files are written
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// CDN base URL the catalog is served from
        #[arg(long)]
        cdn_base_url: String,

        /// Source repository URL recorded in the manifest
        #[arg(long, default_value = "")]
        repository: String,

        /// Page size recorded in the pagination block
        #[arg(long, default_value_t = 10)]
        page_size: u32,
    },

    /// Re-encode files above the size threshold down to the target size
    Compress {
        /// Videos folder
        #[arg(long, default_value = "videos")]
        videos_dir: PathBuf,

        /// Originals are moved here before being replaced
        #[arg(long, default_value = "video-backup")]
        backup_dir: PathBuf,

        /// Files above this size (MB) get compressed
        #[arg(long, default_value_t = 19.5)]
        check_size: f64,

        /// Hard ceiling (MB) for the re-encoded output
        #[arg(long, default_value_t = 16.0)]
        target_size: f64,

        /// Audio bitrate (kbps) reserved out of the size budget
        #[arg(long, default_value_t = 128)]
        audio_bitrate: u32,

        /// Give up after this many encode attempts per file
        #[arg(long, default_value_t = 5)]
        max_attempts: u32,
    },
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{prefix:>10} [{bar:30}] {pos}/{len} {wide_msg}")
            .unwrap()
            .progress_chars("=> "),
    );
    bar
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let t_total = std::time::Instant::now();

    let bar = progress_bar();
    let progress = {
        let bar = bar.clone();
        move |stage: &str, current: u64, total: u64, message: &str| {
            bar.set_prefix(stage.to_string());
            bar.set_length(total.max(1));
            bar.set_position((current + 1).min(total));
            bar.set_message(message.to_string());
        }
    };

    match cli.command {
        Command::Update {
            videos_dir,
            thumbnails_dir,
            output_dir,
            cdn_base_url,
            repository,
            page_size,
        } => {
            let options = UpdateOptions {
                videos_dir,
                thumbnails_dir,
                output_dir,
                cdn: CdnConfig {
                    base_url: cdn_base_url,
                    repository,
                },
                page_size,
            };

            let report = vidcat_core::update(&options, &progress)?;
            bar.finish_and_clear();

            eprintln!(
                "Done! {} video(s), {} frame thumbnail(s), {} placeholder(s) -> {} ({:.2}s)",
                report.total_videos,
                report.jpg_thumbnails,
                report.svg_thumbnails,
                report.data_file,
                t_total.elapsed().as_secs_f64()
            );
            eprintln!("Index updated: {}", report.index_path.display());
        }

        Command::Compress {
            videos_dir,
            backup_dir,
            check_size,
            target_size,
            audio_bitrate,
            max_attempts,
        } => {
            let mut options = CompressOptions::new(videos_dir, backup_dir);
            options.check_size_mb = check_size;
            options.target_size_mb = target_size;
            options.audio_bitrate_kbps = audio_bitrate;
            options.max_attempts = max_attempts;

            let report = vidcat_core::compress_batch(&options, &progress)?;
            bar.finish_and_clear();

            for (filename, outcome) in &report.outcomes {
                match outcome {
                    FileOutcome::Compliant { size_mb } => {
                        eprintln!("  ok       {} ({:.1} MB, within limit)", filename, size_mb);
                    }
                    FileOutcome::Compressed {
                        from_mb,
                        to_mb,
                        attempts,
                        backup_path,
                    } => {
                        eprintln!(
                            "  shrunk   {} {:.1} MB -> {:.1} MB in {} attempt(s), original at {}",
                            filename,
                            from_mb,
                            to_mb,
                            attempts,
                            backup_path.display()
                        );
                    }
                    FileOutcome::Failed { reason } => {
                        eprintln!("  failed   {}: {}", filename, reason);
                    }
                }
            }
            eprintln!(
                "Done! {} compressed, {} within limit, {} failed ({:.2}s)",
                report.compressed,
                report.skipped,
                report.failed,
                t_total.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}
