use crate::backup::is_snapshot_name;
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct SaveSummary {
    pub path: PathBuf,
    pub save_count: usize,
    /// Unix seconds of the newest `.save` file.
    pub latest_save: Option<i64>,
    pub total_bytes: u64,
}

pub fn summarize(saves_dir: &Path) -> Option<SaveSummary> {
    if !saves_dir.is_dir() {
        return None;
    }
    let root_name = saves_dir
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut summary = SaveSummary {
        path: saves_dir.to_path_buf(),
        save_count: 0,
        latest_save: None,
        total_bytes: 0,
    };
    let walker = WalkDir::new(saves_dir)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && is_snapshot_name(&entry.file_name().to_string_lossy(), &root_name))
        });
    for entry in walker.filter_map(|entry| entry.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else {
            continue;
        };
        summary.total_bytes += meta.len();
        let is_save = entry
            .file_name()
            .to_string_lossy()
            .to_ascii_lowercase()
            .ends_with(".save");
        if !is_save {
            continue;
        }
        summary.save_count += 1;
        let modified = meta
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map(|duration| duration.as_secs() as i64);
        if let Some(modified) = modified {
            summary.latest_save = summary.latest_save.max(Some(modified));
        }
    }
    Some(summary)
}

pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let value = bytes as f64;
    if value < KB {
        format!("{bytes} Bytes")
    } else if value < KB * KB {
        format!("{:.2} KB", value / KB)
    } else if value < KB * KB * KB {
        format!("{:.2} MB", value / (KB * KB))
    } else {
        format!("{:.2} GB", value / (KB * KB * KB))
    }
}
