//! The playback queue.
//!
//! A FIFO of queue items with controlled front-insertion. The controller is
//! the sole owner; the player consumes strictly from the front. Intros are
//! pushed together with their song in one call so nothing can interleave
//! between them.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use crate::model::{ContentKey, Song, SongId};

/// What kind of thing a queue item is; rotation bookkeeping and command
/// handling key off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueItemKind {
    Song,
    Intro,
    Outro,
    Announcement,
    ShowSegment,
}

/// One playable item.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub path: PathBuf,
    pub kind: QueueItemKind,
    /// The song this item belongs to (the song itself, or its intro/outro)
    pub song_id: Option<SongId>,
    /// The content-store key behind a generated item
    pub content_key: Option<ContentKey>,
    /// Human-readable label for status displays
    pub label: String,
    /// Expected duration, when known from the catalog
    pub duration_hint: Option<Duration>,
}

impl QueueItem {
    pub fn song(song: &Song) -> Self {
        Self {
            path: song.file_reference.clone(),
            kind: QueueItemKind::Song,
            song_id: Some(song.id.clone()),
            content_key: None,
            label: song.display_label(),
            duration_hint: Some(Duration::from_secs(song.duration_seconds)),
        }
    }

    /// A generated content item (intro, outro, announcement...).
    pub fn content(
        kind: QueueItemKind,
        key: ContentKey,
        path: PathBuf,
        label: impl Into<String>,
    ) -> Self {
        let song_id = match kind {
            QueueItemKind::Intro | QueueItemKind::Outro => {
                Some(SongId::from(key.target_id.as_str()))
            }
            _ => None,
        };
        Self {
            path,
            kind,
            song_id,
            content_key: Some(key),
            label: label.into(),
            duration_hint: None,
        }
    }

    /// A pre-produced show recording.
    pub fn show_segment(path: PathBuf, label: impl Into<String>) -> Self {
        Self {
            path,
            kind: QueueItemKind::ShowSegment,
            song_id: None,
            content_key: None,
            label: label.into(),
            duration_hint: None,
        }
    }
}

/// FIFO queue with front-insertion. Never reordered mid-item.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    items: VecDeque<QueueItem>,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&mut self, item: QueueItem) {
        self.items.push_back(item);
    }

    pub fn push_front(&mut self, item: QueueItem) {
        self.items.push_front(item);
    }

    /// Atomically place an intro directly in front of its song at the head
    /// of the queue. Single call, so no interleaving push can slip between
    /// the two.
    pub fn push_front_pair(&mut self, intro: QueueItem, song: QueueItem) {
        self.items.push_front(song);
        self.items.push_front(intro);
    }

    pub fn pop_front(&mut self) -> Option<QueueItem> {
        self.items.pop_front()
    }

    pub fn peek_front(&self) -> Option<&QueueItem> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }
}
