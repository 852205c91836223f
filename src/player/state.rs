//! Player state machine types and channel messages.

use super::queue::QueueItem;

/// The playback state machine.
///
/// ```text
/// Stopped --play--> Playing <--resume/pause--> Paused
///    ^                 |
///    |             natural end
///    +-- (auto) -- Completed
/// ```
///
/// `Completed` is observable for exactly one event delivery; the worker
/// settles back to `Stopped` immediately after firing the completion
/// notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
    Completed,
}

/// Commands sent to the player worker.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    /// Start playing an item; implies stop of whatever is current
    Play(QueueItem),
    Pause,
    Resume,
    Stop,
    /// Shut the worker down
    Shutdown,
}

/// Events sent from the player worker back to the controller.
///
/// The controller reacts to these instead of polling mid-item state, so a
/// completion is observed exactly once.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    Started(QueueItem),
    /// Natural end of the item; fired at most once per play
    Completed(QueueItem),
    /// The item could not be played; the player is back at Stopped
    Error { item: QueueItem, message: String },
}
