//! Filesystem-backed content store.
//!
//! Layout under the content root:
//!
//! ```text
//! content/<content_type>/<persona>/<target_id>/
//!     script.txt    UTF-8, trailing newline
//!     audit.json    AuditRecord
//!     audio.wav     synthesized audio
//!     flagged       empty marker: regenerate on next run
//! ```
//!
//! All writes are atomic-replace; readers tolerate transient absence and
//! never observe a half-written file.

use std::path::{Path, PathBuf};

use crate::model::{ContentKey, ContentType, PersonaId};
use crate::persist;

use super::{AuditRecord, ContentItem, ContentStatus};

const SCRIPT_FILE: &str = "script.txt";
const AUDIT_FILE: &str = "audit.json";
const AUDIO_FILE: &str = "audio.wav";
const FLAG_FILE: &str = "flagged";

/// Handle to the content tree under one root directory.
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

/// Filter for [`ContentStore::enumerate`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ContentFilter {
    pub content_type: Option<ContentType>,
    pub persona: Option<PersonaId>,
    pub status: Option<ContentStatus>,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one item's artifacts.
    pub fn item_dir(&self, key: &ContentKey) -> PathBuf {
        self.root.join("content").join(key.rel_dir())
    }

    /// Path the item's audio lives at (whether or not it exists yet).
    pub fn audio_path(&self, key: &ContentKey) -> PathBuf {
        self.item_dir(key).join(AUDIO_FILE)
    }

    /// Read an item, deriving its status from which files exist.
    pub fn read_item(&self, key: &ContentKey) -> Result<ContentItem, ContentStoreError> {
        let dir = self.item_dir(key);
        let script_path = dir.join(SCRIPT_FILE);
        let audit_path = dir.join(AUDIT_FILE);
        let audio_path = dir.join(AUDIO_FILE);

        let script_text = match std::fs::read_to_string(&script_path) {
            Ok(text) => Some(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(ContentStoreError::Io(script_path, e)),
        };
        let audit: Option<AuditRecord> = if audit_path.exists() {
            match persist::read_json(&audit_path) {
                Ok(record) => Some(record),
                Err(e) => {
                    // A malformed audit is treated as absent; the next
                    // pipeline run re-audits.
                    tracing::warn!(key = %key, error = %e, "unreadable audit record");
                    None
                }
            }
        } else {
            None
        };
        let audio_file = audio_path.exists().then_some(audio_path);
        let flagged = dir.join(FLAG_FILE).exists();

        let status = derive_status(script_text.is_some(), audit.as_ref(), audio_file.is_some(), flagged);
        Ok(ContentItem { key: key.clone(), status, script_text, audit, audio_file })
    }

    /// Write a new script. Implicitly clears any prior audit, audio, and
    /// flag for the same key: a new script invalidates everything downstream.
    pub fn write_script(&self, key: &ContentKey, text: &str) -> Result<(), ContentStoreError> {
        let dir = self.item_dir(key);
        std::fs::create_dir_all(&dir).map_err(|e| ContentStoreError::Io(dir.clone(), e))?;

        let mut body = text.trim_end().to_string();
        body.push('\n');
        let path = dir.join(SCRIPT_FILE);
        persist::atomic_write(&path, body.as_bytes())
            .map_err(|e| ContentStoreError::Io(path, e))?;

        for stale in [AUDIT_FILE, AUDIO_FILE, FLAG_FILE] {
            let path = dir.join(stale);
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ContentStoreError::Io(path, e)),
            }
        }
        Ok(())
    }

    /// Write the audit record for an existing script.
    pub fn write_audit(
        &self,
        key: &ContentKey,
        record: &AuditRecord,
    ) -> Result<(), ContentStoreError> {
        let dir = self.item_dir(key);
        if !dir.join(SCRIPT_FILE).exists() {
            return Err(ContentStoreError::MissingScript(key.clone()));
        }
        let path = dir.join(AUDIT_FILE);
        persist::atomic_write_json(&path, record).map_err(|e| ContentStoreError::Io(path, e))
    }

    /// Write synthesized audio.
    ///
    /// Calling this without a passing audit on disk is a programming error
    /// in the pipeline, not a recoverable condition.
    pub fn write_audio(&self, key: &ContentKey, bytes: &[u8]) -> Result<(), ContentStoreError> {
        let item = self.read_item(key)?;
        if !item.audit.as_ref().is_some_and(|a| a.passed) {
            return Err(ContentStoreError::AuditRequired(key.clone()));
        }
        let path = self.audio_path(key);
        persist::atomic_write(&path, bytes).map_err(|e| ContentStoreError::Io(path, e))
    }

    /// Drop the `flagged` marker: regenerate on the next pipeline run.
    pub fn mark_flagged(&self, key: &ContentKey) -> Result<(), ContentStoreError> {
        let dir = self.item_dir(key);
        std::fs::create_dir_all(&dir).map_err(|e| ContentStoreError::Io(dir.clone(), e))?;
        let path = dir.join(FLAG_FILE);
        std::fs::write(&path, b"").map_err(|e| ContentStoreError::Io(path, e))
    }

    pub fn clear_flag(&self, key: &ContentKey) -> Result<(), ContentStoreError> {
        let path = self.item_dir(key).join(FLAG_FILE);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ContentStoreError::Io(path, e)),
        }
    }

    /// List existing item keys matching `filter`, in path order.
    pub fn enumerate(&self, filter: &ContentFilter) -> Result<Vec<ContentKey>, ContentStoreError> {
        let mut keys = Vec::new();
        let content_dir = self.root.join("content");
        if !content_dir.exists() {
            return Ok(keys);
        }

        let types: Vec<ContentType> = match filter.content_type {
            Some(ct) => vec![ct],
            None => ContentType::ALL.to_vec(),
        };
        let personas: Vec<PersonaId> = match filter.persona {
            Some(p) => vec![p],
            None => PersonaId::ALL.to_vec(),
        };

        for ct in types {
            for persona in &personas {
                let dir = content_dir.join(ct.as_str()).join(persona.as_str());
                if !dir.exists() {
                    continue;
                }
                let entries =
                    std::fs::read_dir(&dir).map_err(|e| ContentStoreError::Io(dir.clone(), e))?;
                let mut targets: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().is_dir())
                    .filter_map(|e| e.file_name().into_string().ok())
                    .collect();
                targets.sort();

                for target in targets {
                    let key = ContentKey::new(ct, *persona, target);
                    if let Some(wanted) = filter.status {
                        if self.read_item(&key)?.status != wanted {
                            continue;
                        }
                    }
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }
}

fn derive_status(
    has_script: bool,
    audit: Option<&AuditRecord>,
    has_audio: bool,
    flagged: bool,
) -> ContentStatus {
    if flagged {
        return ContentStatus::Flagged;
    }
    match (has_script, audit, has_audio) {
        (false, _, _) => ContentStatus::Absent,
        (true, None, _) => ContentStatus::ScriptOnly,
        (true, Some(a), false) => {
            if a.passed {
                ContentStatus::AuditedPass
            } else {
                ContentStatus::AuditedFail
            }
        }
        (true, Some(a), true) => {
            if a.passed {
                ContentStatus::AudioReady
            } else {
                // Audio next to a failed audit should not happen; the audit
                // verdict wins and the audio is ignored.
                ContentStatus::AuditedFail
            }
        }
    }
}

/// Content store errors.
#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("audio written without a passing audit for {0}")]
    AuditRequired(ContentKey),

    #[error("audit written without a script for {0}")]
    MissingScript(ContentKey),

    #[error("content store I/O error at {0}: {1}")]
    Io(PathBuf, std::io::Error),
}
