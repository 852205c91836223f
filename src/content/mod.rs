//! Generated content: items, audit records, and the on-disk store.
//!
//! Every content item is addressed by a [`ContentKey`] and owns up to three
//! artifacts on disk: the script, the audit verdict, and the synthesized
//! audio. The store derives an item's lifecycle status from which artifacts
//! exist, so the filesystem itself is the source of truth.

mod store;

pub use store::{ContentFilter, ContentStore, ContentStoreError};

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::ContentKey;

/// Lifecycle status of a content item, derived from its artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentStatus {
    /// No artifacts
    Absent,
    /// A script exists but has not been audited
    ScriptOnly,
    /// Audited and above the pass threshold; awaiting synthesis
    AuditedPass,
    /// Audited below the pass threshold; excluded from synthesis
    AuditedFail,
    /// Script, passing audit, and audio all present
    AudioReady,
    /// Operator flagged for regeneration on the next pipeline run
    Flagged,
}

/// One content item as read from the store.
#[derive(Debug, Clone)]
pub struct ContentItem {
    pub key: ContentKey,
    pub status: ContentStatus,
    pub script_text: Option<String>,
    pub audit: Option<AuditRecord>,
    pub audio_file: Option<PathBuf>,
}

impl ContentItem {
    /// Whether the station may queue this item's audio.
    pub fn playable(&self) -> bool {
        self.status == ContentStatus::AudioReady
    }
}

/// The auditor's verdict on one script. Immutable once written; replaced
/// wholesale on regeneration. Field order matches the on-disk contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub overall_score: f64,
    pub passed: bool,
    /// Scores keyed by the closed criterion set, all on the same 0-10 scale
    pub criteria_scores: BTreeMap<String, f64>,
    pub issues: Vec<String>,
    pub notes: String,
    /// Raw auditor output, retained for debugging
    pub raw_response: String,
}

/// Issue string recorded when the auditor's output cannot be parsed.
pub const ISSUE_UNPARSEABLE: &str = "auditor_output_unparseable";

impl AuditRecord {
    /// The record written for an unparseable auditor response: scores zero,
    /// failed, with the well-known issue string. Consumes a regeneration
    /// credit like any other failed audit.
    pub fn unparseable(raw_response: impl Into<String>) -> Self {
        Self {
            overall_score: 0.0,
            passed: false,
            criteria_scores: BTreeMap::new(),
            issues: vec![ISSUE_UNPARSEABLE.to_string()],
            notes: String::new(),
            raw_response: raw_response.into(),
        }
    }
}
