//! Read-only status snapshot of the station.
//!
//! A plain value type produced by the controller on demand; any display
//! surface can consume it. Producing a snapshot has no side effects.

use std::time::Duration;

use crate::model::PersonaId;
use crate::player::{PlaybackState, QueueItemKind};

/// Observable state of the station at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub state: PlaybackState,
    pub persona: PersonaId,
    pub persona_name: String,
    /// Kind and label of the current item, if any
    pub current: Option<(QueueItemKind, String)>,
    /// Label of the next queued item
    pub next: Option<String>,
    pub uptime: Duration,
    pub songs_played: u64,
    pub error_count: u64,
    /// Operator-visible note, e.g. the quiet-idle warning
    pub message: Option<String>,
}

impl StatusSnapshot {
    /// One-line rendering for a plain terminal surface.
    pub fn render_line(&self) -> String {
        let state = match self.state {
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
            PlaybackState::Stopped | PlaybackState::Completed => "idle",
        };
        let current = self
            .current
            .as_ref()
            .map(|(kind, label)| format!("{:?}: {}", kind, label))
            .unwrap_or_else(|| "-".to_string());
        let next = self.next.as_deref().unwrap_or("unknown");
        let mut line = format!(
            "[{}] {} | {} | next: {} | songs {} | errors {}",
            self.persona_name, state, current, next, self.songs_played, self.error_count
        );
        if let Some(message) = &self.message {
            line.push_str(&format!(" | {}", message));
        }
        line
    }
}
