//! Pipeline run checkpoint.
//!
//! The checkpoint is the durable record of a run's progress: which keys
//! each stage has finished, how many regeneration credits each key has
//! burned, and the configuration the run was started with. It is written
//! atomically after every successful item, so a killed process resumes from
//! the first incomplete key. Failure to write it is the one pipeline error
//! we refuse to work through: no recorded progress, no progress.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{ContentType, PersonaId};
use crate::persist;

/// The three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Audit,
    Synthesize,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Generate => "generate",
            Stage::Audit => "audit",
            Stage::Synthesize => "synthesize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

/// Orchestration order of a run. A resume must use the ordering the
/// checkpoint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingMode {
    /// One tenant per stage pass; minimal model switches (default)
    StageMajor,
    /// All three stages per item; useful in test mode
    ItemMajor,
}

/// Per-stage progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    pub status: StageStatus,
    pub processed: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub completed_keys: BTreeSet<String>,
}

impl Default for StageState {
    fn default() -> Self {
        Self {
            status: StageStatus::NotStarted,
            processed: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            completed_keys: BTreeSet::new(),
        }
    }
}

/// The batch configuration a run was started with; a resume must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub content_types: Vec<ContentType>,
    pub personas: Vec<PersonaId>,
    pub limit: Option<usize>,
    pub test_mode: bool,
    pub ordering: OrderingMode,
}

/// The singleton checkpoint for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineCheckpoint {
    /// Timestamp-based run identifier
    pub run_id: String,
    pub config: ConfigSnapshot,
    pub generate: StageState,
    pub audit: StageState,
    pub synthesize: StageState,
    /// Regeneration credits consumed per key
    #[serde(default)]
    pub regen_counts: BTreeMap<String, u32>,
}

impl PipelineCheckpoint {
    pub fn new(config: ConfigSnapshot) -> Self {
        Self {
            run_id: chrono::Utc::now().format("%Y%m%d-%H%M%S").to_string(),
            config,
            generate: StageState::default(),
            audit: StageState::default(),
            synthesize: StageState::default(),
            regen_counts: BTreeMap::new(),
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageState {
        match stage {
            Stage::Generate => &self.generate,
            Stage::Audit => &self.audit,
            Stage::Synthesize => &self.synthesize,
        }
    }

    pub fn stage_mut(&mut self, stage: Stage) -> &mut StageState {
        match stage {
            Stage::Generate => &mut self.generate,
            Stage::Audit => &mut self.audit,
            Stage::Synthesize => &mut self.synthesize,
        }
    }

    pub fn is_complete(&self, stage: Stage, key: &str) -> bool {
        self.stage(stage).completed_keys.contains(key)
    }

    pub fn mark_complete(&mut self, stage: Stage, key: &str) {
        self.stage_mut(stage).completed_keys.insert(key.to_string());
    }

    /// Un-complete a key in a stage (a regeneration invalidated its work).
    pub fn invalidate(&mut self, stage: Stage, key: &str) {
        self.stage_mut(stage).completed_keys.remove(key);
    }

    /// Regeneration credits consumed so far for a key.
    pub fn regen_count(&self, key: &str) -> u32 {
        self.regen_counts.get(key).copied().unwrap_or(0)
    }

    pub fn consume_regen_credit(&mut self, key: &str) -> u32 {
        let count = self.regen_counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Load an existing checkpoint, if one exists.
    pub fn load(path: &Path) -> Result<Option<Self>, CheckpointWriteFailure> {
        if !path.exists() {
            return Ok(None);
        }
        persist::read_json(path)
            .map(Some)
            .map_err(|e| CheckpointWriteFailure { path: path.to_path_buf(), source: e })
    }

    /// Persist atomically. A failure here is fatal to the run.
    pub fn save(&self, path: &Path) -> Result<(), CheckpointWriteFailure> {
        persist::atomic_write_json(path, self)
            .map_err(|e| CheckpointWriteFailure { path: path.to_path_buf(), source: e })
    }
}

/// Checkpoint persistence failure. FATAL: the run aborts rather than work
/// without recorded progress.
#[derive(Debug, thiserror::Error)]
#[error("cannot persist pipeline checkpoint at {path}: {source}")]
pub struct CheckpointWriteFailure {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
