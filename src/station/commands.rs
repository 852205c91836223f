//! Operator command ingress.
//!
//! A bounded buffer between the keyboard and the controller loop. The
//! reader thread never blocks: when the buffer is full the oldest pending
//! command is dropped with a warning. The controller drains the buffer
//! non-blockingly once per tick, preserving arrival order.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossterm::event::{Event, KeyCode, KeyEventKind, KeyModifiers};
use parking_lot::Mutex;

/// The closed operator command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationCommand {
    /// Graceful shutdown
    Quit,
    /// Toggle pause/resume
    PauseToggle,
    /// Stop the current item; the controller advances
    Skip,
    /// Banish the current song, then skip
    BanishCurrent,
    /// Flag the currently playing intro for regeneration; does not skip
    FlagCurrentIntro,
    /// Promote the current song to Core
    PromoteCurrent,
}

/// Map a pressed key to a command. Unknown keys are ignored.
pub fn command_for_key(c: char) -> Option<StationCommand> {
    match c.to_ascii_lowercase() {
        'q' => Some(StationCommand::Quit),
        'p' => Some(StationCommand::PauseToggle),
        's' => Some(StationCommand::Skip),
        'b' => Some(StationCommand::BanishCurrent),
        'f' => Some(StationCommand::FlagCurrentIntro),
        'r' => Some(StationCommand::PromoteCurrent),
        _ => None,
    }
}

/// Bounded command buffer shared between the key reader and the controller.
#[derive(Debug)]
pub struct CommandBuffer {
    inner: Mutex<VecDeque<StationCommand>>,
    capacity: usize,
}

impl CommandBuffer {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(VecDeque::new()), capacity })
    }

    /// Append a command, dropping the oldest pending one when full. Never
    /// blocks the key loop.
    pub fn push(&self, command: StationCommand) {
        let mut queue = self.inner.lock();
        if queue.len() >= self.capacity {
            let dropped = queue.pop_front();
            tracing::warn!(target: "station::commands", ?dropped, "command buffer full");
        }
        queue.push_back(command);
    }

    /// Take all pending commands in arrival order.
    pub fn drain(&self) -> Vec<StationCommand> {
        self.inner.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Spawn the raw-mode keyboard reader.
///
/// Runs until `stop` is raised. Ctrl-C maps to Quit so an interrupt behaves
/// like a graceful shutdown request.
pub fn spawn_key_reader(
    buffer: Arc<CommandBuffer>,
    stop: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    crossterm::terminal::enable_raw_mode()?;
    std::thread::Builder::new().name("keys".to_string()).spawn(move || {
        while !stop.load(Ordering::SeqCst) {
            match crossterm::event::poll(Duration::from_millis(100)) {
                Ok(true) => {
                    let Ok(event) = crossterm::event::read() else { break };
                    if let Event::Key(key) = event {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        if key.code == KeyCode::Char('c')
                            && key.modifiers.contains(KeyModifiers::CONTROL)
                        {
                            buffer.push(StationCommand::Quit);
                            continue;
                        }
                        if let KeyCode::Char(c) = key.code {
                            if let Some(command) = command_for_key(c) {
                                tracing::debug!(target: "station::commands", ?command, "key");
                                buffer.push(command);
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(target: "station::commands", error = %e, "key poll failed");
                    break;
                }
            }
        }
        let _ = crossterm::terminal::disable_raw_mode();
    })
}
