//! Rotation engine: per-song tier state and weighted random selection.
//!
//! Songs sit in one of three tiers. Core gets the configured share of the
//! draws, Discovery gets the rest, Banished is never selectable. Discovery
//! songs graduate to Core automatically once they have been played to
//! completion enough times.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::model::{Song, SongId, Tier};
use crate::persist;

/// Rotation state for one song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationRecord {
    pub tier: Tier,
    pub play_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_played_at: Option<DateTime<Utc>>,
    /// Id of the last counted play event, for exactly-once accounting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl RotationRecord {
    fn new() -> Self {
        Self { tier: Tier::Discovery, play_count: 0, last_played_at: None, last_event_id: None }
    }
}

/// The rotation engine. Owns one [`RotationRecord`] per known song.
#[derive(Debug, Clone)]
pub struct RotationEngine {
    records: BTreeMap<SongId, RotationRecord>,
    core_ratio: f64,
    graduation_threshold: u32,
}

impl RotationEngine {
    pub fn new(core_ratio: f64, graduation_threshold: u32) -> Self {
        Self { records: BTreeMap::new(), core_ratio, graduation_threshold }
    }

    /// Make sure every catalog song has a record; new songs start in
    /// Discovery. Existing records are left untouched.
    pub fn sync_catalog(&mut self, catalog: &Catalog) {
        for song in catalog.all_songs() {
            self.records.entry(song.id.clone()).or_insert_with(RotationRecord::new);
        }
    }

    pub fn tier_of(&self, id: &SongId) -> Result<Tier, RotationError> {
        self.records
            .get(id)
            .map(|r| r.tier)
            .ok_or_else(|| RotationError::SongNotFound(id.clone()))
    }

    pub fn record(&self, id: &SongId) -> Option<&RotationRecord> {
        self.records.get(id)
    }

    /// Count a completed play.
    ///
    /// When the caller passes an `event_id`, a duplicate invocation with the
    /// same id is a no-op; without one, every call counts. Graduation from
    /// Discovery to Core happens exactly when the counter reaches the
    /// threshold.
    pub fn record_play(
        &mut self,
        id: &SongId,
        event_id: Option<&str>,
    ) -> Result<Tier, RotationError> {
        let threshold = self.graduation_threshold;
        let record =
            self.records.get_mut(id).ok_or_else(|| RotationError::SongNotFound(id.clone()))?;

        if let Some(event) = event_id {
            if record.last_event_id.as_deref() == Some(event) {
                return Ok(record.tier);
            }
            record.last_event_id = Some(event.to_string());
        }

        record.play_count += 1;
        record.last_played_at = Some(Utc::now());
        if record.tier == Tier::Discovery && record.play_count >= threshold {
            record.tier = Tier::Core;
            tracing::info!(song = %id, plays = record.play_count, "graduated to core rotation");
        }
        Ok(record.tier)
    }

    /// Explicitly promote a song to Core.
    pub fn promote(&mut self, id: &SongId) -> Result<(), RotationError> {
        let record =
            self.records.get_mut(id).ok_or_else(|| RotationError::SongNotFound(id.clone()))?;
        record.tier = Tier::Core;
        Ok(())
    }

    /// Banish a song. Terminal until an explicit [`restore`](Self::restore).
    pub fn banish(&mut self, id: &SongId) -> Result<(), RotationError> {
        let record =
            self.records.get_mut(id).ok_or_else(|| RotationError::SongNotFound(id.clone()))?;
        record.tier = Tier::Banished;
        Ok(())
    }

    /// Bring a banished song back, into Discovery.
    pub fn restore(&mut self, id: &SongId) -> Result<(), RotationError> {
        let record =
            self.records.get_mut(id).ok_or_else(|| RotationError::SongNotFound(id.clone()))?;
        if record.tier == Tier::Banished {
            record.tier = Tier::Discovery;
        }
        Ok(())
    }

    /// Weighted random selection of the next song.
    ///
    /// Draws from Core with probability `core_ratio`, else from Discovery,
    /// uniformly within the chosen tier. An empty tier falls back to the
    /// other; `None` only when no non-Banished song exists.
    pub fn next_song<'c>(&self, catalog: &'c Catalog, rng: &mut impl Rng) -> Option<&'c Song> {
        let mut core: Vec<&Song> = Vec::new();
        let mut discovery: Vec<&Song> = Vec::new();
        for song in catalog.all_songs() {
            match self.records.get(&song.id).map(|r| r.tier) {
                Some(Tier::Core) => core.push(song),
                Some(Tier::Discovery) | None => discovery.push(song),
                Some(Tier::Banished) => {}
            }
        }

        let (primary, fallback) = if rng.random_bool(self.core_ratio) {
            (core, discovery)
        } else {
            (discovery, core)
        };
        let pool = if primary.is_empty() { fallback } else { primary };
        if pool.is_empty() {
            return None;
        }
        Some(pool[rng.random_range(0..pool.len())])
    }

    /// Load rotation state from disk. A missing file yields an empty engine.
    pub fn load(
        path: &Path,
        core_ratio: f64,
        graduation_threshold: u32,
    ) -> Result<Self, RotationError> {
        let mut engine = Self::new(core_ratio, graduation_threshold);
        if !path.exists() {
            return Ok(engine);
        }
        engine.records = persist::read_json(path)
            .map_err(|e| RotationError::Io(path.to_path_buf(), e))?;
        Ok(engine)
    }

    /// Save rotation state with atomic-replace semantics.
    pub fn save(&self, path: &Path) -> Result<(), RotationError> {
        persist::atomic_write_json(path, &self.records)
            .map_err(|e| RotationError::Io(path.to_path_buf(), e))
    }
}

/// Rotation errors. An unknown id is a caller bug and is raised, never
/// swallowed.
#[derive(Debug, thiserror::Error)]
pub enum RotationError {
    #[error("unknown song id: {0}")]
    SongNotFound(SongId),

    #[error("rotation I/O error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{song, test_catalog};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::tempdir;

    fn engine_for(catalog: &Catalog) -> RotationEngine {
        let mut engine = RotationEngine::new(0.7, 5);
        engine.sync_catalog(catalog);
        engine
    }

    #[test]
    fn test_new_songs_start_in_discovery() {
        let catalog = test_catalog(3);
        let engine = engine_for(&catalog);
        for s in catalog.all_songs() {
            assert_eq!(engine.tier_of(&s.id).unwrap(), Tier::Discovery);
        }
    }

    #[test]
    fn test_unknown_id_raises() {
        let engine = RotationEngine::new(0.7, 5);
        let id = SongId::from("missing");
        assert!(matches!(engine.tier_of(&id), Err(RotationError::SongNotFound(_))));
        let mut engine = engine;
        assert!(engine.banish(&id).is_err());
        assert!(engine.record_play(&id, None).is_err());
    }

    #[test]
    fn test_graduation_on_exact_threshold() {
        let catalog = test_catalog(1);
        let mut engine = engine_for(&catalog);
        let id = catalog.all_songs().next().unwrap().id.clone();

        for play in 1..=4u32 {
            engine.record_play(&id, None).unwrap();
            assert_eq!(engine.tier_of(&id).unwrap(), Tier::Discovery, "play {}", play);
        }
        assert_eq!(engine.record_play(&id, None).unwrap(), Tier::Core);
        // Stays Core afterwards
        engine.record_play(&id, None).unwrap();
        assert_eq!(engine.tier_of(&id).unwrap(), Tier::Core);
        assert_eq!(engine.record(&id).unwrap().play_count, 6);
    }

    #[test]
    fn test_record_play_idempotent_with_event_id() {
        let catalog = test_catalog(1);
        let mut engine = engine_for(&catalog);
        let id = catalog.all_songs().next().unwrap().id.clone();

        engine.record_play(&id, Some("evt-1")).unwrap();
        engine.record_play(&id, Some("evt-1")).unwrap();
        assert_eq!(engine.record(&id).unwrap().play_count, 1);

        engine.record_play(&id, Some("evt-2")).unwrap();
        assert_eq!(engine.record(&id).unwrap().play_count, 2);
    }

    #[test]
    fn test_banished_never_selected() {
        let catalog = test_catalog(3);
        let mut engine = engine_for(&catalog);
        let banned = catalog.all_songs().next().unwrap().id.clone();
        engine.banish(&banned).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let pick = engine.next_song(&catalog, &mut rng).unwrap();
            assert_ne!(pick.id, banned);
        }
    }

    #[test]
    fn test_all_banished_returns_none() {
        let catalog = test_catalog(2);
        let mut engine = engine_for(&catalog);
        for s in catalog.all_songs() {
            engine.banish(&s.id).unwrap();
        }
        let mut rng = StdRng::seed_from_u64(1);
        assert!(engine.next_song(&catalog, &mut rng).is_none());
    }

    #[test]
    fn test_empty_tier_falls_back() {
        // Only Discovery songs: Core draws must still produce something.
        let catalog = test_catalog(2);
        let engine = engine_for(&catalog);
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..100 {
            assert!(engine.next_song(&catalog, &mut rng).is_some());
        }
    }

    #[test]
    fn test_core_ratio_in_aggregate() {
        // Half the songs Core, half Discovery; over many draws the Core
        // share converges on core_ratio within a coarse tolerance.
        let mut catalog = Catalog::new();
        for i in 0..10 {
            catalog.add_song(song("Artist", &format!("Track {}", i), 180));
        }
        let mut engine = engine_for(&catalog);
        let core_ids: Vec<SongId> =
            catalog.all_songs().take(5).map(|s| s.id.clone()).collect();
        for id in &core_ids {
            engine.promote(id).unwrap();
        }

        let mut rng = StdRng::seed_from_u64(42);
        let draws = 1000;
        let mut core_hits = 0;
        for _ in 0..draws {
            let pick = engine.next_song(&catalog, &mut rng).unwrap();
            if core_ids.contains(&pick.id) {
                core_hits += 1;
            }
        }
        let fraction = core_hits as f64 / draws as f64;
        assert!((fraction - 0.7).abs() < 0.10, "core fraction was {}", fraction);
    }

    #[test]
    fn test_restore_returns_to_discovery() {
        let catalog = test_catalog(1);
        let mut engine = engine_for(&catalog);
        let id = catalog.all_songs().next().unwrap().id.clone();

        engine.banish(&id).unwrap();
        assert_eq!(engine.tier_of(&id).unwrap(), Tier::Banished);
        engine.restore(&id).unwrap();
        assert_eq!(engine.tier_of(&id).unwrap(), Tier::Discovery);
    }

    #[test]
    fn test_save_load_preserves_counters_and_tiers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotation.json");
        let catalog = test_catalog(3);
        let mut engine = engine_for(&catalog);

        let ids: Vec<SongId> = catalog.all_songs().map(|s| s.id.clone()).collect();
        engine.promote(&ids[0]).unwrap();
        engine.banish(&ids[1]).unwrap();
        engine.record_play(&ids[2], None).unwrap();
        engine.record_play(&ids[2], None).unwrap();

        engine.save(&path).unwrap();
        let loaded = RotationEngine::load(&path, 0.7, 5).unwrap();

        assert_eq!(loaded.tier_of(&ids[0]).unwrap(), Tier::Core);
        assert_eq!(loaded.tier_of(&ids[1]).unwrap(), Tier::Banished);
        assert_eq!(loaded.record(&ids[2]).unwrap().play_count, 2);
        assert!(loaded.record(&ids[2]).unwrap().last_played_at.is_some());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let engine = RotationEngine::load(&dir.path().join("rotation.json"), 0.7, 5).unwrap();
        assert!(engine.records.is_empty());
    }
}
