//! The content generation pipeline.
//!
//! A resumable batch processor that drives every (content type, persona,
//! target) key through three stages: Generate (script text from the writer
//! model), Audit (quality verdict from the audit model), and Synthesize
//! (voice-cloned audio from TTS). The gatekeeper keeps the three models
//! from ever sharing the GPU; the checkpoint makes any run resumable at
//! item granularity.

pub mod audit;
pub mod brief;
pub mod checkpoint;
pub mod clients;
pub mod orchestrator;
pub mod progress;
pub mod sanitize;
pub mod targets;

pub use checkpoint::{OrderingMode, PipelineCheckpoint, Stage};
pub use orchestrator::{BatchConfig, Orchestrator, PipelineFatal, RunMode, RunSummary, StageFilter};
pub use targets::TargetSelection;
