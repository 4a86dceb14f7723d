use std::fs;
use std::path::Path;

use crate::media::{has_video_extension, VideoFile};

/// Enumerate video files directly inside `videos_dir`, sorted by filename.
pub fn scan_videos(videos_dir: &Path) -> anyhow::Result<Vec<VideoFile>> {
    let mut files = Vec::new();

    for entry in fs::read_dir(videos_dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || !has_video_extension(&path) {
            continue;
        }
        let Some(filename) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
            continue;
        };
        let size = entry.metadata()?.len();
        files.push(VideoFile::new(path, filename, size));
    }

    files.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["zeta.mp4", "alpha.MKV", "notes.txt", "cover.jpg", "beta.webm"] {
            fs::write(dir.path().join(name), b"data").unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).unwrap();

        let files = scan_videos(dir.path()).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["alpha.MKV", "beta.webm", "zeta.mp4"]);
        assert!(files.iter().all(|f| f.size == 4));
    }

    #[test]
    fn test_scan_missing_dir_errors() {
        let dir = tempdir().unwrap();
        assert!(scan_videos(&dir.path().join("absent")).is_err());
    }
}
