//! The audio player.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │        Station controller (its thread)       │
//! │   owns the queue, decides what plays next    │
//! └──────────────────┬───────────────────────────┘
//!                    │ crossbeam channels
//!                    ▼
//! ┌──────────────────────────────────────────────┐
//! │              Player worker thread            │
//! │  drives the AudioSink, polls for completion, │
//! │  emits Started/Completed/Error events        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! The controller sends [`PlayerCommand`]s and reacts to [`PlayerEvent`]s;
//! it never blocks on playback. Completion fires at most once per play.

mod queue;
mod sink;
mod state;

pub use queue::{PlaybackQueue, QueueItem, QueueItemKind};
pub use sink::{AudioSink, MpvSink, TimerSink};
pub use state::{PlaybackState, PlayerCommand, PlayerEvent};

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::RwLock;

/// Playback errors. Reported per item; the station keeps running.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio file missing or unreadable: {0}")]
    FileMissing(PathBuf),

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("player channel closed")]
    ChannelClosed,
}

/// Shared view of the worker's state.
#[derive(Debug, Default)]
struct SharedState {
    state: PlaybackState,
    current: Option<QueueItem>,
}

/// Handle to the player worker thread.
pub struct Player {
    command_tx: Sender<PlayerCommand>,
    event_rx: Receiver<PlayerEvent>,
    shared: Arc<RwLock<SharedState>>,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    /// Spawn the worker around an audio sink.
    pub fn spawn(sink: Box<dyn AudioSink>) -> Self {
        let (command_tx, command_rx) = bounded::<PlayerCommand>(32);
        let (event_tx, event_rx) = bounded::<PlayerEvent>(64);
        let shared = Arc::new(RwLock::new(SharedState::default()));

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("player".to_string())
            .spawn(move || worker_loop(sink, command_rx, event_tx, worker_shared))
            .expect("failed to spawn player thread");

        Self { command_tx, event_rx, shared, worker: Some(worker) }
    }

    pub fn play(&self, item: QueueItem) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Play(item))
    }

    pub fn pause(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Stop)
    }

    fn send(&self, command: PlayerCommand) -> Result<(), PlaybackError> {
        tracing::debug!(target: "player::commands", ?command, "send");
        self.command_tx.send(command).map_err(|_| PlaybackError::ChannelClosed)
    }

    /// Current state snapshot.
    pub fn state(&self) -> PlaybackState {
        self.shared.read().state
    }

    /// The item being played or paused, if any.
    pub fn current(&self) -> Option<QueueItem> {
        self.shared.read().current.clone()
    }

    /// Drain pending events without blocking.
    pub fn poll_events(&self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop playback and join the worker. Bounded by the worker's poll
    /// quantum, so this returns quickly.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(PlayerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.command_tx.send(PlayerCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// How often the worker polls the sink for natural end.
const POLL_QUANTUM: Duration = Duration::from_millis(25);

fn worker_loop(
    mut sink: Box<dyn AudioSink>,
    command_rx: Receiver<PlayerCommand>,
    event_tx: Sender<PlayerEvent>,
    shared: Arc<RwLock<SharedState>>,
) {
    let emit = |event: PlayerEvent| {
        tracing::debug!(target: "player::events", ?event, "emit");
        let _ = event_tx.send(event);
    };
    let set_state = |state: PlaybackState, current: Option<QueueItem>| {
        let mut guard = shared.write();
        guard.state = state;
        guard.current = current;
    };

    loop {
        match command_rx.recv_timeout(POLL_QUANTUM) {
            Ok(PlayerCommand::Play(item)) => {
                // Implicit stop of whatever was current
                if shared.read().state != PlaybackState::Stopped {
                    sink.stop();
                }
                match sink.start(&item) {
                    Ok(()) => {
                        set_state(PlaybackState::Playing, Some(item.clone()));
                        emit(PlayerEvent::Started(item));
                    }
                    Err(e) => {
                        set_state(PlaybackState::Stopped, None);
                        emit(PlayerEvent::Error { item, message: e.to_string() });
                    }
                }
            }
            Ok(PlayerCommand::Pause) => {
                if shared.read().state == PlaybackState::Playing {
                    sink.pause();
                    let current = shared.read().current.clone();
                    set_state(PlaybackState::Paused, current);
                }
            }
            Ok(PlayerCommand::Resume) => {
                if shared.read().state == PlaybackState::Paused {
                    sink.resume();
                    let current = shared.read().current.clone();
                    set_state(PlaybackState::Playing, current);
                }
            }
            Ok(PlayerCommand::Stop) => {
                sink.stop();
                set_state(PlaybackState::Stopped, None);
            }
            Ok(PlayerCommand::Shutdown) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                sink.stop();
                set_state(PlaybackState::Stopped, None);
                break;
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // Poll for natural end
                let playing = shared.read().state == PlaybackState::Playing;
                if playing && sink.is_finished() {
                    let item = shared.read().current.clone();
                    if let Some(item) = item {
                        // Completed is observable until the event is fired,
                        // then the machine settles back to Stopped.
                        set_state(PlaybackState::Completed, Some(item.clone()));
                        emit(PlayerEvent::Completed(item));
                        set_state(PlaybackState::Stopped, None);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::wait_for_event;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn playable(secs: u64) -> (QueueItem, NamedTempFile) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"fake audio").unwrap();
        let item = QueueItem {
            path: file.path().to_path_buf(),
            kind: QueueItemKind::Song,
            song_id: None,
            content_key: None,
            label: "test item".to_string(),
            duration_hint: Some(Duration::from_secs(secs)),
        };
        (item, file)
    }

    #[test]
    fn test_play_to_natural_end() {
        // 10s scaled by 0.002 = 20ms of "playback"
        let player = Player::spawn(Box::new(TimerSink::scaled(0.002)));
        let (item, _file) = playable(10);

        player.play(item.clone()).unwrap();
        let events = wait_for_event(&player, |e| matches!(e, PlayerEvent::Completed(_)));

        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Started(_))));
        let completions = events
            .iter()
            .filter(|e| matches!(e, PlayerEvent::Completed(_)))
            .count();
        assert_eq!(completions, 1, "completion fires exactly once");
        assert_eq!(player.state(), PlaybackState::Stopped);
        assert!(player.current().is_none());
        player.shutdown();
    }

    #[test]
    fn test_missing_file_fires_error_and_stops() {
        let player = Player::spawn(Box::new(TimerSink::scaled(0.002)));
        let item = QueueItem {
            path: PathBuf::from("/no/such/file.wav"),
            kind: QueueItemKind::Song,
            song_id: None,
            content_key: None,
            label: "ghost".to_string(),
            duration_hint: Some(Duration::from_secs(10)),
        };

        player.play(item).unwrap();
        let events = wait_for_event(&player, |e| matches!(e, PlayerEvent::Error { .. }));

        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Error { .. })));
        assert_eq!(player.state(), PlaybackState::Stopped);
        player.shutdown();
    }

    #[test]
    fn test_pause_resume_cycle() {
        let player = Player::spawn(Box::new(TimerSink::scaled(0.004)));
        let (item, _file) = playable(10); // 40ms playback

        player.play(item).unwrap();
        wait_for_event(&player, |e| matches!(e, PlayerEvent::Started(_)));

        player.pause().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(player.state(), PlaybackState::Paused);
        assert!(player.current().is_some());

        player.resume().unwrap();
        let events = wait_for_event(&player, |e| matches!(e, PlayerEvent::Completed(_)));
        assert!(events.iter().any(|e| matches!(e, PlayerEvent::Completed(_))));
        player.shutdown();
    }

    #[test]
    fn test_stop_produces_no_completion() {
        let player = Player::spawn(Box::new(TimerSink::scaled(1.0)));
        let (item, _file) = playable(600);

        player.play(item).unwrap();
        wait_for_event(&player, |e| matches!(e, PlayerEvent::Started(_)));
        player.stop().unwrap();
        std::thread::sleep(Duration::from_millis(60));

        assert_eq!(player.state(), PlaybackState::Stopped);
        let events = player.poll_events();
        assert!(!events.iter().any(|e| matches!(e, PlayerEvent::Completed(_))));
        player.shutdown();
    }

    #[test]
    fn test_play_supersedes_current_item() {
        let player = Player::spawn(Box::new(TimerSink::scaled(0.002)));
        let (long_item, _f1) = playable(600);
        let (short_item, _f2) = playable(5); // 10ms

        player.play(long_item).unwrap();
        wait_for_event(&player, |e| matches!(e, PlayerEvent::Started(_)));
        player.play(short_item.clone()).unwrap();

        let events = wait_for_event(&player, |e| matches!(e, PlayerEvent::Completed(_)));
        // Only the superseding item completes
        let completed: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                PlayerEvent::Completed(i) => Some(i.path.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![short_item.path]);
        player.shutdown();
    }
}
