//! Recursive music directory scanning.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::metadata;
use crate::model::Song;

use super::CatalogError;

/// Outcome of a directory scan: accepted songs plus per-file failures.
/// A single bad file never aborts the scan.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub accepted: Vec<Song>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Walk `root` recursively and read metadata from every audio file.
///
/// An unreadable root directory is fatal; anything wrong with an individual
/// file lands in [`ScanResult::failed`].
pub fn scan_directory(root: &Path) -> Result<ScanResult, CatalogError> {
    // Probe the root up front so "directory missing" is a clear error
    // instead of an empty result.
    std::fs::read_dir(root).map_err(|e| CatalogError::MusicLibrary(root.to_path_buf(), e))?;

    let mut result = ScanResult::default();
    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                result.failed.push((path, e.to_string()));
                continue;
            }
        };
        if !entry.file_type().is_file() || !metadata::is_audio_file(entry.path()) {
            continue;
        }

        match metadata::read(entry.path()) {
            Ok(meta) => {
                let mut song =
                    Song::new(meta.artist, meta.title, meta.duration_seconds, entry.path());
                song.album = meta.album;
                song.year = meta.year;
                tracing::debug!(id = %song.id, path = %entry.path().display(), "scanned");
                result.accepted.push(song);
            }
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "skipping file");
                result.failed.push((entry.path().to_path_buf(), e.to_string()));
            }
        }
    }
    Ok(result)
}
