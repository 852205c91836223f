//! Audio output backends.
//!
//! The player worker drives a sink through a narrow polling interface:
//! start a file, pause/resume/stop it, and ask whether it has finished.
//! The real backend shells out to mpv one file at a time; the timer sink
//! "plays" silence for the item's duration and exists for tests and
//! audio-less environments.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use super::PlaybackError;
use super::queue::QueueItem;

/// Fallback length for items with no duration hint (announcements whose
/// length we never probed).
const DEFAULT_ITEM_SECS: u64 = 10;

/// One-file-at-a-time audio backend.
pub trait AudioSink: Send {
    /// Begin playing an item. Any previous playback is superseded.
    fn start(&mut self, item: &QueueItem) -> Result<(), PlaybackError>;
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// Poll for natural end of the current item.
    fn is_finished(&mut self) -> bool;
}

// ============================================================================
// Timer sink
// ============================================================================

/// A sink that plays nothing and finishes after the item's duration,
/// scaled. Used by tests (with a tiny scale) and `--dry-run`-style
/// environments with no audio output.
pub struct TimerSink {
    /// Multiplier applied to item durations (1.0 = real time)
    scale: f64,
    /// Require the file to exist, like a real backend would
    verify_exists: bool,
    deadline: Option<Instant>,
    remaining_at_pause: Option<Duration>,
}

impl TimerSink {
    pub fn new() -> Self {
        Self::scaled(1.0)
    }

    pub fn scaled(scale: f64) -> Self {
        Self { scale, verify_exists: true, deadline: None, remaining_at_pause: None }
    }

    fn scaled_duration(&self, item: &QueueItem) -> Duration {
        let base = item.duration_hint.unwrap_or(Duration::from_secs(DEFAULT_ITEM_SECS));
        base.mul_f64(self.scale)
    }
}

impl Default for TimerSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for TimerSink {
    fn start(&mut self, item: &QueueItem) -> Result<(), PlaybackError> {
        if self.verify_exists && !item.path.exists() {
            return Err(PlaybackError::FileMissing(item.path.clone()));
        }
        self.deadline = Some(Instant::now() + self.scaled_duration(item));
        self.remaining_at_pause = None;
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(deadline) = self.deadline.take() {
            self.remaining_at_pause =
                Some(deadline.saturating_duration_since(Instant::now()));
        }
    }

    fn resume(&mut self) {
        if let Some(remaining) = self.remaining_at_pause.take() {
            self.deadline = Some(Instant::now() + remaining);
        }
    }

    fn stop(&mut self) {
        self.deadline = None;
        self.remaining_at_pause = None;
    }

    fn is_finished(&mut self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            // Paused or stopped items never finish on their own
            None => false,
        }
    }
}

// ============================================================================
// mpv sink
// ============================================================================

/// Plays files through an mpv child process, one per item.
///
/// Pause is implemented by killing the process and remembering the elapsed
/// offset; resume restarts mpv with `--start=<offset>`. Crude next to an
/// IPC socket, but it keeps the backend to a single observable: the child's
/// exit.
pub struct MpvSink {
    binary: PathBuf,
    child: Option<Child>,
    current: Option<PathBuf>,
    started_at: Option<Instant>,
    /// Seconds into the item at the moment of pause
    paused_offset: f64,
}

impl MpvSink {
    pub fn new() -> Result<Self, PlaybackError> {
        let binary = which_mpv().ok_or_else(|| {
            PlaybackError::Backend("mpv binary not found on PATH".to_string())
        })?;
        Ok(Self { binary, child: None, current: None, started_at: None, paused_offset: 0.0 })
    }

    fn spawn(&mut self, path: &Path, start_secs: f64) -> Result<(), PlaybackError> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--no-video")
            .arg("--really-quiet")
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if start_secs > 0.0 {
            cmd.arg(format!("--start={:.1}", start_secs));
        }
        cmd.arg(path);
        let child = cmd.spawn().map_err(|e| {
            PlaybackError::Backend(format!("failed to spawn mpv: {}", e))
        })?;
        self.child = Some(child);
        self.started_at = Some(Instant::now());
        Ok(())
    }

    fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for MpvSink {
    fn drop(&mut self) {
        self.kill_child();
    }
}

impl AudioSink for MpvSink {
    fn start(&mut self, item: &QueueItem) -> Result<(), PlaybackError> {
        self.kill_child();
        if !item.path.exists() {
            return Err(PlaybackError::FileMissing(item.path.clone()));
        }
        self.current = Some(item.path.clone());
        self.paused_offset = 0.0;
        self.spawn(&item.path.clone(), 0.0)
    }

    fn pause(&mut self) {
        if self.child.is_some() {
            if let Some(started) = self.started_at {
                self.paused_offset += started.elapsed().as_secs_f64();
            }
            self.kill_child();
        }
    }

    fn resume(&mut self) {
        if self.child.is_none() {
            if let Some(path) = self.current.clone() {
                let offset = self.paused_offset;
                if let Err(e) = self.spawn(&path, offset) {
                    tracing::warn!(error = %e, "mpv resume failed");
                }
            }
        }
    }

    fn stop(&mut self) {
        self.kill_child();
        self.current = None;
        self.paused_offset = 0.0;
    }

    fn is_finished(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(Some(_status)) => {
                    self.child = None;
                    self.current = None;
                    true
                }
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(error = %e, "mpv wait failed");
                    self.child = None;
                    true
                }
            },
            // No child and no pause offset means nothing is playing;
            // a paused item is not finished.
            None => false,
        }
    }
}

fn which_mpv() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).map(|dir| dir.join("mpv")).find(|p| p.is_file())
}
