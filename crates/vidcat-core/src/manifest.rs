use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};

/// Canned display titles for well-known clip names.
const TITLE_KEYWORDS: &[(&str, &str)] = &[
    ("intro", "Product Introduction"),
    ("tutorial", "Getting Started Tutorial"),
    ("demo", "Feature Demo"),
    ("guide", "Operation Guide"),
    ("overview", "System Overview"),
];

const TITLE_DESCRIPTIONS: &[(&str, &str)] = &[
    (
        "Product Introduction",
        "A full walkthrough of the product's features and use cases",
    ),
    (
        "Getting Started Tutorial",
        "Step-by-step usage instructions and setup notes",
    ),
    (
        "Feature Demo",
        "A hands-on demonstration of the core features",
    ),
    ("Operation Guide", "Concrete operating steps and caveats"),
    (
        "System Overview",
        "The overall architecture and its main modules",
    ),
];

/// Friendly display title derived from a filename stem.
pub fn friendly_title(stem: &str) -> String {
    let lower = stem.to_lowercase();
    for (keyword, title) in TITLE_KEYWORDS {
        if lower.contains(keyword) {
            return (*title).to_string();
        }
    }
    title_case(&stem.replace(['_', '-'], " "))
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn description_for(title: &str) -> String {
    for (known, description) in TITLE_DESCRIPTIONS {
        if *known == title {
            return (*description).to_string();
        }
    }
    format!("Walkthrough video for {}", title)
}

/// Where the catalog is served from. Passed in explicitly; the URL scheme
/// is the CDN provider's `<base>/<kind>/<file>` layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// e.g. `https://cdn.example.net/gh/user/video-host@main`
    pub base_url: String,
    /// Source repository URL recorded in the manifest.
    pub repository: String,
}

impl CdnConfig {
    pub fn video_url(&self, filename: &str) -> String {
        format!("{}/videos/{}", self.base(), filename)
    }

    pub fn thumbnail_url(&self, filename: &str) -> String {
        format!("{}/thumbnails/{}", self.base(), filename)
    }

    pub fn data_url(&self, filename: &str) -> String {
        format!("{}/{}", self.base(), filename)
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// One manifest record. Field names are the downstream viewer's contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: u32,
    pub title: String,
    pub filename: String,
    pub url: String,
    pub description: String,
    pub duration: String,
    pub size: String,
    pub thumbnail: String,
    pub codec: String,
    pub resolution: String,
    pub created_at: String,
    pub thumbnail_type: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u32,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    /// Single-page pagination block for `total` entries.
    pub fn single_page(total: u32, page_size: u32) -> Self {
        let page_size = page_size.max(1);
        Self {
            total,
            page: 1,
            page_size,
            total_pages: total.div_ceil(page_size),
            has_next: false,
            has_prev: false,
        }
    }
}

/// The versioned data file a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub videos: Vec<CatalogEntry>,
    pub pagination: Pagination,
    pub last_updated: String,
    pub timestamp: u64,
    pub filename: String,
    pub repository: String,
    pub ffmpeg_available: bool,
}

/// The small stable index consumers fetch first. Pointing it at a fresh
/// timestamped data file is what defeats CDN caching of the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogIndex {
    pub latest: String,
    pub timestamp: u64,
    pub last_updated: String,
    pub data_url: String,
}

/// Name of the versioned data file for a run.
pub fn data_filename(timestamp: u64) -> String {
    format!("videos_{}.json", timestamp)
}

/// Serialize `value` to `path` atomically (temp file + rename), so a
/// concurrent reader never sees a half-written manifest.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let temp_path = path.with_extension("json.tmp");
    let file = File::create(&temp_path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

pub fn now_iso_utc() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

pub fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}
