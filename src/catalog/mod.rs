//! The library catalog: persistent map from song id to metadata.
//!
//! The catalog exclusively owns [`Song`] records. Everything else reads
//! through it; mutation happens only via operator commands and scans. The
//! persisted form is a human-readable JSON object keyed by song id.

mod scan;

pub use scan::{ScanResult, scan_directory};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Song, SongId};
use crate::persist;

/// In-memory catalog. Iteration order is the id order, which keeps pipeline
/// target enumeration deterministic.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    songs: BTreeMap<SongId, Song>,
}

/// Persisted form of one song: the id lives in the map key, not the value.
#[derive(Debug, Serialize, Deserialize)]
struct StoredSong {
    artist: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    year: Option<i32>,
    duration_seconds: u64,
    file_reference: PathBuf,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a song; returns its id.
    pub fn add_song(&mut self, song: Song) -> SongId {
        let id = song.id.clone();
        self.songs.insert(id.clone(), song);
        id
    }

    pub fn get_song(&self, id: &SongId) -> Option<&Song> {
        self.songs.get(id)
    }

    pub fn contains(&self, id: &SongId) -> bool {
        self.songs.contains_key(id)
    }

    pub fn all_songs(&self) -> impl Iterator<Item = &Song> {
        self.songs.values()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Load a catalog from disk.
    ///
    /// Entries with missing required fields are skipped with a warning;
    /// optional fields may be absent. A missing or unparseable file is fatal
    /// to the caller.
    pub fn load(path: &Path) -> Result<Catalog, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.to_path_buf()));
        }
        let body = std::fs::read_to_string(path)
            .map_err(|e| CatalogError::Io(path.to_path_buf(), e))?;
        let raw: serde_json::Map<String, serde_json::Value> = serde_json::from_str(&body)
            .map_err(|e| CatalogError::Parse(path.to_path_buf(), e.to_string()))?;

        let mut songs = BTreeMap::new();
        for (id, value) in raw {
            match serde_json::from_value::<StoredSong>(value) {
                Ok(stored) => {
                    if stored.duration_seconds == 0 {
                        tracing::warn!(id = %id, "skipping catalog entry with zero duration");
                        continue;
                    }
                    let id = SongId::from(id.as_str());
                    songs.insert(
                        id.clone(),
                        Song {
                            id,
                            artist: stored.artist,
                            title: stored.title,
                            album: stored.album,
                            year: stored.year,
                            duration_seconds: stored.duration_seconds,
                            file_reference: stored.file_reference,
                        },
                    );
                }
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping malformed catalog entry");
                }
            }
        }
        Ok(Catalog { songs })
    }

    /// Save the catalog with atomic-replace semantics.
    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        let stored: BTreeMap<&str, StoredSong> = self
            .songs
            .values()
            .map(|s| {
                (
                    s.id.as_str(),
                    StoredSong {
                        artist: s.artist.clone(),
                        title: s.title.clone(),
                        album: s.album.clone(),
                        year: s.year,
                        duration_seconds: s.duration_seconds,
                        file_reference: s.file_reference.clone(),
                    },
                )
            })
            .collect();
        persist::atomic_write_json(path, &stored)
            .map_err(|e| CatalogError::Io(path.to_path_buf(), e))
    }
}

/// Catalog errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog file not found: {0}")]
    NotFound(PathBuf),

    #[error("music library directory is unreadable: {0}: {1}")]
    MusicLibrary(PathBuf, std::io::Error),

    #[error("catalog I/O error at {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("failed to parse catalog {0}: {1}")]
    Parse(PathBuf, String),
}
