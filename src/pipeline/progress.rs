//! Progress reporting for pipeline runs.
//!
//! The orchestrator emits updates on an abstract sink; the terminal
//! renderer is one consumer, tests are another.

use crate::model::ContentKey;

use super::checkpoint::Stage;

/// What happened to one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Skipped,
    Failed,
}

/// Sink for orchestrator progress updates.
pub trait ProgressSink: Send + Sync {
    fn stage_started(&self, stage: Stage, total: usize);
    fn item_finished(&self, stage: Stage, key: &ContentKey, done: usize, total: usize, outcome: ItemOutcome);
    fn stage_finished(&self, stage: Stage);
}

/// Terminal renderer: one updating line per stage.
pub struct TerminalProgress;

impl ProgressSink for TerminalProgress {
    fn stage_started(&self, stage: Stage, total: usize) {
        println!("{}: {} targets", stage, total);
    }

    fn item_finished(
        &self,
        _stage: Stage,
        key: &ContentKey,
        done: usize,
        total: usize,
        outcome: ItemOutcome,
    ) {
        let mark = match outcome {
            ItemOutcome::Succeeded => "ok",
            ItemOutcome::Skipped => "skip",
            ItemOutcome::Failed => "FAIL",
        };
        print!("\r  [{}/{}] {} ({})        ", done, total, key, mark);
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    fn stage_finished(&self, stage: Stage) {
        println!("\n{} done", stage);
    }
}

/// Discards everything; for dry runs and quiet callers.
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn stage_started(&self, _stage: Stage, _total: usize) {}
    fn item_finished(
        &self,
        _stage: Stage,
        _key: &ContentKey,
        _done: usize,
        _total: usize,
        _outcome: ItemOutcome,
    ) {
    }
    fn stage_finished(&self, _stage: Stage) {}
}

/// Collects updates for assertions.
#[cfg(test)]
pub struct MemoryProgress {
    pub events: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl MemoryProgress {
    pub fn new() -> Self {
        Self { events: parking_lot::Mutex::new(Vec::new()) }
    }
}

#[cfg(test)]
impl ProgressSink for MemoryProgress {
    fn stage_started(&self, stage: Stage, total: usize) {
        self.events.lock().push(format!("start {} {}", stage, total));
    }

    fn item_finished(
        &self,
        stage: Stage,
        key: &ContentKey,
        _done: usize,
        _total: usize,
        outcome: ItemOutcome,
    ) {
        let mark = match outcome {
            ItemOutcome::Succeeded => "ok",
            ItemOutcome::Skipped => "skip",
            ItemOutcome::Failed => "fail",
        };
        self.events.lock().push(format!("{} {} {}", stage, key, mark));
    }

    fn stage_finished(&self, stage: Stage) {
        self.events.lock().push(format!("end {}", stage));
    }
}
