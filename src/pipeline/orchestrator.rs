//! The three-stage pipeline engine.
//!
//! Drives every target through Generate → Audit → Synthesize, honoring the
//! gatekeeper, writing artifacts through the content store, and updating
//! the checkpoint after every item. Two orderings exist: stage-major runs
//! one tenant per stage pass (minimal model switches; regeneration rounds
//! re-run Generate/Audit over just the failed keys), item-major walks each
//! target through all three stages in turn.
//!
//! Per-item failures never abort a run; they are counted, summarized, and
//! skipped. The one exception is checkpoint persistence: if progress cannot
//! be recorded, the run aborts.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::catalog::Catalog;
use crate::config::{PipelineConfig, ShowConfig};
use crate::content::{AuditRecord, ContentStatus, ContentStore};
use crate::gatekeeper::{GateError, Gatekeeper, Tenant};
use crate::model::{ContentKey, Persona, PersonaId};
use crate::rotation::RotationEngine;
use crate::schedule::ShiftSchedule;

use super::brief::{BriefSubject, build_brief};
use super::checkpoint::{
    CheckpointWriteFailure, ConfigSnapshot, OrderingMode, PipelineCheckpoint, Stage, StageState,
    StageStatus,
};
use super::clients::{AuditorClient, AuditorFailure, TtsClient, TtsFailure, WriterClient, WriterFailure};
use super::progress::{ItemOutcome, ProgressSink};
use super::sanitize::sanitize;
use super::targets::{Target, TargetSelection, TargetSubject, enumerate_targets};

/// Which stages a run executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageFilter {
    All,
    Only(Stage),
    /// Generate and Audit, skipping synthesis (`--skip-audio`)
    SkipAudio,
}

impl StageFilter {
    pub fn includes(&self, stage: Stage) -> bool {
        match self {
            StageFilter::All => true,
            StageFilter::Only(s) => *s == stage,
            StageFilter::SkipAudio => stage != Stage::Synthesize,
        }
    }
}

/// Production vs test mode. Test mode is wired up by the CLI: deterministic
/// fake auditor, optional fake TTS, reduced target set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Production,
    Test,
}

/// One batch run's configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub selection: TargetSelection,
    pub stage_filter: StageFilter,
    pub mode: RunMode,
    pub ordering: OrderingMode,
    pub resume: bool,
    pub dry_run: bool,
    /// Seed for `--random` shuffling; a fresh seed per run when None
    pub seed: Option<u64>,
}

/// End-of-run report.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    /// The run reached the end of every requested stage
    pub completed: bool,
    pub cancelled: bool,
    pub planned: Vec<ContentKey>,
    pub generate: StageState,
    pub audit: StageState,
    pub synthesize: StageState,
    pub failures: Vec<(ContentKey, String)>,
}

impl RunSummary {
    /// Human-readable summary for the operator.
    pub fn render(&self) -> String {
        let mut out = format!("run {}: {} targets\n", self.run_id, self.planned.len());
        for (name, stage) in [
            ("generate", &self.generate),
            ("audit", &self.audit),
            ("synthesize", &self.synthesize),
        ] {
            out.push_str(&format!(
                "  {:<11} processed {:>4}  passed {:>4}  failed {:>4}  skipped {:>4}\n",
                name, stage.processed, stage.passed, stage.failed, stage.skipped
            ));
        }
        if !self.failures.is_empty() {
            out.push_str("top failures:\n");
            for (key, reason) in self.failures.iter().take(10) {
                out.push_str(&format!("  {}: {}\n", key, reason));
            }
        }
        if self.cancelled {
            out.push_str("run cancelled; resume with --resume\n");
        }
        out
    }
}

/// Fatal pipeline conditions; everything else is a per-item failure.
#[derive(Debug, thiserror::Error)]
pub enum PipelineFatal {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointWriteFailure),

    #[error("gatekeeper misuse: {0}")]
    Gate(#[from] GateError),

    #[error("cannot resume: {0}")]
    ResumeMismatch(String),
}

/// Mutable state threaded through one run.
struct RunState {
    checkpoint: PipelineCheckpoint,
    failures: Vec<(ContentKey, String)>,
    cancelled: bool,
}

/// The pipeline engine.
pub struct Orchestrator {
    store: ContentStore,
    gate: Arc<Gatekeeper>,
    writer: Arc<dyn WriterClient>,
    auditor: Arc<dyn AuditorClient>,
    tts: Arc<dyn TtsClient>,
    settings: PipelineConfig,
    personas: BTreeMap<PersonaId, Persona>,
    checkpoint_path: PathBuf,
    progress: Arc<dyn ProgressSink>,
    cancel: Arc<AtomicBool>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: ContentStore,
        gate: Arc<Gatekeeper>,
        writer: Arc<dyn WriterClient>,
        auditor: Arc<dyn AuditorClient>,
        tts: Arc<dyn TtsClient>,
        settings: PipelineConfig,
        personas: Vec<Persona>,
        checkpoint_path: PathBuf,
        progress: Arc<dyn ProgressSink>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            store,
            gate,
            writer,
            auditor,
            tts,
            settings,
            personas: personas.into_iter().map(|p| (p.id, p)).collect(),
            checkpoint_path,
            progress,
            cancel,
        }
    }

    /// Execute one batch run.
    pub async fn run(
        &self,
        batch: &BatchConfig,
        catalog: &Catalog,
        rotation: &RotationEngine,
        schedule: &ShiftSchedule,
        shows: &[ShowConfig],
    ) -> Result<RunSummary, PipelineFatal> {
        let mut rng = match batch.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let targets =
            enumerate_targets(&batch.selection, catalog, rotation, schedule, shows, &mut rng);
        let planned: Vec<ContentKey> = targets.iter().map(|t| t.key.clone()).collect();

        if batch.dry_run {
            tracing::info!(targets = targets.len(), "dry run; no backend will be called");
            let empty = PipelineCheckpoint::new(self.snapshot(batch));
            return Ok(self.summary(&empty, planned, Vec::new(), false, true));
        }

        let mut state = self.open_checkpoint(batch)?;

        // A resume with nothing left to do must not write anything.
        if batch.resume && self.all_requested_complete(batch, &state.checkpoint) {
            tracing::info!("all requested stages already complete; nothing to do");
            let checkpoint = state.checkpoint;
            return Ok(self.summary(&checkpoint, planned, Vec::new(), false, true));
        }

        match batch.ordering {
            OrderingMode::StageMajor => self.run_stage_major(batch, &mut state, &targets, catalog).await?,
            OrderingMode::ItemMajor => self.run_item_major(batch, &mut state, &targets, catalog).await?,
        }

        let completed = !state.cancelled;
        if completed {
            for stage in [Stage::Generate, Stage::Audit, Stage::Synthesize] {
                if batch.stage_filter.includes(stage) {
                    state.checkpoint.stage_mut(stage).status = StageStatus::Completed;
                }
            }
        }
        state.checkpoint.save(&self.checkpoint_path)?;

        let RunState { checkpoint, failures, cancelled } = state;
        Ok(self.summary(&checkpoint, planned, failures, cancelled, completed))
    }

    fn snapshot(&self, batch: &BatchConfig) -> ConfigSnapshot {
        ConfigSnapshot {
            content_types: batch.selection.content_types.clone(),
            personas: batch.selection.personas.clone(),
            limit: batch.selection.limit,
            test_mode: batch.mode == RunMode::Test,
            ordering: batch.ordering,
        }
    }

    /// Open (or create) the checkpoint for this run.
    ///
    /// A matching checkpoint is reused so completed work is skipped across
    /// runs; `--resume` additionally demands the match and keeps statuses.
    /// A fresh (non-resume) run re-enters every stage with fresh
    /// regeneration credits.
    fn open_checkpoint(&self, batch: &BatchConfig) -> Result<RunState, PipelineFatal> {
        let snapshot = self.snapshot(batch);
        let existing = PipelineCheckpoint::load(&self.checkpoint_path)?;

        let checkpoint = match existing {
            Some(cp) if cp.config == snapshot => {
                let mut cp = cp;
                if !batch.resume {
                    for stage in [Stage::Generate, Stage::Audit, Stage::Synthesize] {
                        cp.stage_mut(stage).status = StageStatus::NotStarted;
                    }
                    cp.regen_counts.clear();
                }
                tracing::info!(run_id = %cp.run_id, resume = batch.resume, "continuing checkpoint");
                cp
            }
            Some(cp) if batch.resume => {
                return Err(PipelineFatal::ResumeMismatch(format!(
                    "checkpoint {} was created with a different configuration \
                     (ordering {:?}); rerun without --resume",
                    cp.run_id, cp.config.ordering
                )));
            }
            _ => PipelineCheckpoint::new(snapshot),
        };
        Ok(RunState { checkpoint, failures: Vec::new(), cancelled: false })
    }

    fn all_requested_complete(&self, batch: &BatchConfig, cp: &PipelineCheckpoint) -> bool {
        [Stage::Generate, Stage::Audit, Stage::Synthesize]
            .into_iter()
            .filter(|s| batch.stage_filter.includes(*s))
            .all(|s| cp.stage(s).status == StageStatus::Completed)
    }

    fn summary(
        &self,
        cp: &PipelineCheckpoint,
        planned: Vec<ContentKey>,
        failures: Vec<(ContentKey, String)>,
        cancelled: bool,
        completed: bool,
    ) -> RunSummary {
        RunSummary {
            run_id: cp.run_id.clone(),
            completed,
            cancelled,
            planned,
            generate: cp.generate.clone(),
            audit: cp.audit.clone(),
            synthesize: cp.synthesize.clone(),
            failures,
        }
    }

    // ========================================================================
    // Orderings
    // ========================================================================

    async fn run_stage_major(
        &self,
        batch: &BatchConfig,
        state: &mut RunState,
        targets: &[Target],
        catalog: &Catalog,
    ) -> Result<(), PipelineFatal> {
        if batch.stage_filter.includes(Stage::Generate) && !state.cancelled {
            self.generate_pass(state, targets, catalog).await?;
        }

        if batch.stage_filter.includes(Stage::Audit) && !state.cancelled {
            // Audit failures re-enter Generate; each round burns one
            // regeneration credit per failing key, so this terminates.
            loop {
                let regen = self.audit_pass(state, targets).await?;
                if regen.is_empty() || state.cancelled {
                    break;
                }
                tracing::info!(keys = regen.len(), "regenerating failed scripts");
                self.generate_pass(state, &regen, catalog).await?;
                if state.cancelled {
                    break;
                }
            }
        }

        if batch.stage_filter.includes(Stage::Synthesize) && !state.cancelled {
            self.synthesize_pass(state, targets).await?;
        }
        Ok(())
    }

    async fn run_item_major(
        &self,
        batch: &BatchConfig,
        state: &mut RunState,
        targets: &[Target],
        catalog: &Catalog,
    ) -> Result<(), PipelineFatal> {
        let total = targets.len();
        for (idx, target) in targets.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                state.cancelled = true;
                break;
            }
            let pos = (idx + 1, total);

            if batch.stage_filter.includes(Stage::Generate) {
                let outcome = self
                    .gate
                    .with_tenant(Tenant::Writer, self.generate_one(state, target, catalog))
                    .await??;
                self.progress.item_finished(Stage::Generate, &target.key, pos.0, pos.1, outcome);
            }

            if batch.stage_filter.includes(Stage::Audit) {
                loop {
                    let (outcome, needs_regen) = self
                        .gate
                        .with_tenant(Tenant::Auditor, self.audit_one(state, target))
                        .await??;
                    self.progress.item_finished(Stage::Audit, &target.key, pos.0, pos.1, outcome);
                    if !needs_regen {
                        break;
                    }
                    let outcome = self
                        .gate
                        .with_tenant(Tenant::Writer, self.generate_one(state, target, catalog))
                        .await??;
                    self.progress.item_finished(Stage::Generate, &target.key, pos.0, pos.1, outcome);
                    if outcome != ItemOutcome::Succeeded {
                        break;
                    }
                }
            }

            if batch.stage_filter.includes(Stage::Synthesize) {
                let outcome = self
                    .gate
                    .with_tenant(Tenant::Synthesizer, self.synthesize_one(state, target))
                    .await??;
                self.progress.item_finished(Stage::Synthesize, &target.key, pos.0, pos.1, outcome);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Stage passes (stage-major)
    // ========================================================================

    async fn generate_pass(
        &self,
        state: &mut RunState,
        targets: &[Target],
        catalog: &Catalog,
    ) -> Result<(), PipelineFatal> {
        let total = targets.len();
        self.progress.stage_started(Stage::Generate, total);
        state.checkpoint.stage_mut(Stage::Generate).status = StageStatus::InProgress;
        state.checkpoint.save(&self.checkpoint_path)?;

        let result = self
            .gate
            .with_tenant(Tenant::Writer, async {
                for (idx, target) in targets.iter().enumerate() {
                    if self.cancel.load(Ordering::SeqCst) {
                        state.cancelled = true;
                        break;
                    }
                    let outcome = self.generate_one(state, target, catalog).await?;
                    self.progress.item_finished(Stage::Generate, &target.key, idx + 1, total, outcome);
                }
                Ok::<(), PipelineFatal>(())
            })
            .await?;
        result?;

        self.progress.stage_finished(Stage::Generate);
        Ok(())
    }

    /// Audit all targets; returns the ones to regenerate.
    async fn audit_pass(
        &self,
        state: &mut RunState,
        targets: &[Target],
    ) -> Result<Vec<Target>, PipelineFatal> {
        let total = targets.len();
        self.progress.stage_started(Stage::Audit, total);
        state.checkpoint.stage_mut(Stage::Audit).status = StageStatus::InProgress;
        state.checkpoint.save(&self.checkpoint_path)?;

        let mut regen = Vec::new();
        let result = self
            .gate
            .with_tenant(Tenant::Auditor, async {
                for (idx, target) in targets.iter().enumerate() {
                    if self.cancel.load(Ordering::SeqCst) {
                        state.cancelled = true;
                        break;
                    }
                    let (outcome, needs_regen) = self.audit_one(state, target).await?;
                    if needs_regen {
                        regen.push(target.clone());
                    }
                    self.progress.item_finished(Stage::Audit, &target.key, idx + 1, total, outcome);
                }
                Ok::<(), PipelineFatal>(())
            })
            .await?;
        result?;

        self.progress.stage_finished(Stage::Audit);
        Ok(regen)
    }

    async fn synthesize_pass(
        &self,
        state: &mut RunState,
        targets: &[Target],
    ) -> Result<(), PipelineFatal> {
        let total = targets.len();
        self.progress.stage_started(Stage::Synthesize, total);
        state.checkpoint.stage_mut(Stage::Synthesize).status = StageStatus::InProgress;
        state.checkpoint.save(&self.checkpoint_path)?;

        let result = self
            .gate
            .with_tenant(Tenant::Synthesizer, async {
                for (idx, target) in targets.iter().enumerate() {
                    if self.cancel.load(Ordering::SeqCst) {
                        state.cancelled = true;
                        break;
                    }
                    let outcome = self.synthesize_one(state, target).await?;
                    self.progress.item_finished(Stage::Synthesize, &target.key, idx + 1, total, outcome);
                }
                Ok::<(), PipelineFatal>(())
            })
            .await?;
        result?;

        self.progress.stage_finished(Stage::Synthesize);
        Ok(())
    }

    // ========================================================================
    // Single-item stage logic (shared by both orderings)
    // ========================================================================

    async fn generate_one(
        &self,
        state: &mut RunState,
        target: &Target,
        catalog: &Catalog,
    ) -> Result<ItemOutcome, PipelineFatal> {
        let key = &target.key;
        let keystr = key.to_string();

        let item = match self.store.read_item(key) {
            Ok(item) => item,
            Err(e) => return self.fail_item(state, Stage::Generate, key, e.to_string()),
        };
        if state.checkpoint.is_complete(Stage::Generate, &keystr)
            && item.script_text.is_some()
            && item.status != ContentStatus::Flagged
        {
            state.checkpoint.stage_mut(Stage::Generate).skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }

        let persona = &self.personas[&key.persona];
        let subject = match &target.subject {
            TargetSubject::Song(id) => match catalog.get_song(id) {
                Some(song) => BriefSubject::Song(song),
                None => {
                    return self.fail_item(
                        state,
                        Stage::Generate,
                        key,
                        "song no longer in catalog".to_string(),
                    );
                }
            },
            TargetSubject::TimeSlot(slot) => BriefSubject::TimeSlot(*slot),
            TargetSubject::Weather(window) => BriefSubject::Weather(*window),
            TargetSubject::Show { title } => BriefSubject::Show { title },
            TargetSubject::Handoff { to, at } => {
                BriefSubject::Handoff { to: &self.personas[to].display_name, at: *at }
            }
        };
        let brief = build_brief(key.content_type, persona, &key.target_id, &subject);

        let mut attempt = 0;
        let raw = loop {
            match self.writer.write(&brief).await {
                Ok(raw) => break raw,
                Err(WriterFailure::Transient(msg)) if attempt < self.settings.writer_retries => {
                    attempt += 1;
                    tracing::warn!(key = %keystr, attempt, error = %msg, "writer retry");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => return self.fail_item(state, Stage::Generate, key, e.to_string()),
            }
        };

        let script = sanitize(&raw);
        if script.is_empty() {
            return self.fail_item(
                state,
                Stage::Generate,
                key,
                WriterFailure::BadOutput("nothing left after sanitization".to_string()).to_string(),
            );
        }

        if let Err(e) = self.store.write_script(key, &script) {
            return self.fail_item(state, Stage::Generate, key, e.to_string());
        }

        // A new script invalidates downstream work for this key.
        state.checkpoint.mark_complete(Stage::Generate, &keystr);
        state.checkpoint.invalidate(Stage::Audit, &keystr);
        state.checkpoint.invalidate(Stage::Synthesize, &keystr);
        let stage = state.checkpoint.stage_mut(Stage::Generate);
        stage.processed += 1;
        stage.passed += 1;
        state.checkpoint.save(&self.checkpoint_path)?;
        Ok(ItemOutcome::Succeeded)
    }

    /// Audit one target. Returns the outcome plus whether the key should
    /// re-enter Generate.
    async fn audit_one(
        &self,
        state: &mut RunState,
        target: &Target,
    ) -> Result<(ItemOutcome, bool), PipelineFatal> {
        let key = &target.key;
        let keystr = key.to_string();

        let item = match self.store.read_item(key) {
            Ok(item) => item,
            Err(e) => return Ok((self.fail_item(state, Stage::Audit, key, e.to_string())?, false)),
        };
        let Some(script) = item.script_text else {
            // Generate failed or was filtered out for this key
            state.checkpoint.stage_mut(Stage::Audit).skipped += 1;
            return Ok((ItemOutcome::Skipped, false));
        };
        if state.checkpoint.is_complete(Stage::Audit, &keystr) && item.audit.is_some() {
            state.checkpoint.stage_mut(Stage::Audit).skipped += 1;
            return Ok((ItemOutcome::Skipped, false));
        }

        let mut attempt = 0;
        let record: AuditRecord = loop {
            match self.auditor.audit(&script, key.persona, key.content_type).await {
                Ok(record) => break record,
                // A malformed verdict is a failed audit, never a crash.
                Err(AuditorFailure::Malformed(raw)) => break AuditRecord::unparseable(raw),
                Err(AuditorFailure::Transient(msg))
                    if attempt < self.settings.auditor_retries =>
                {
                    attempt += 1;
                    tracing::warn!(key = %keystr, attempt, error = %msg, "auditor retry");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => {
                    return Ok((self.fail_item(state, Stage::Audit, key, e.to_string())?, false));
                }
            }
        };

        if let Err(e) = self.store.write_audit(key, &record) {
            return Ok((self.fail_item(state, Stage::Audit, key, e.to_string())?, false));
        }
        state.checkpoint.mark_complete(Stage::Audit, &keystr);
        let stage = state.checkpoint.stage_mut(Stage::Audit);
        stage.processed += 1;

        let mut needs_regen = false;
        if record.passed {
            stage.passed += 1;
        } else {
            stage.failed += 1;
            if state.checkpoint.regen_count(&keystr) < self.settings.regeneration_cap {
                state.checkpoint.consume_regen_credit(&keystr);
                // The next Generate pass must not skip this key.
                state.checkpoint.invalidate(Stage::Generate, &keystr);
                state.checkpoint.invalidate(Stage::Audit, &keystr);
                state.checkpoint.invalidate(Stage::Synthesize, &keystr);
                needs_regen = true;
            } else {
                tracing::warn!(key = %keystr, "regeneration cap reached; leaving as failed audit");
            }
        }
        state.checkpoint.save(&self.checkpoint_path)?;
        let outcome = if record.passed { ItemOutcome::Succeeded } else { ItemOutcome::Failed };
        Ok((outcome, needs_regen))
    }

    async fn synthesize_one(
        &self,
        state: &mut RunState,
        target: &Target,
    ) -> Result<ItemOutcome, PipelineFatal> {
        let key = &target.key;
        let keystr = key.to_string();

        let item = match self.store.read_item(key) {
            Ok(item) => item,
            Err(e) => return self.fail_item(state, Stage::Synthesize, key, e.to_string()),
        };
        if item.status == ContentStatus::AudioReady {
            state.checkpoint.mark_complete(Stage::Synthesize, &keystr);
            state.checkpoint.stage_mut(Stage::Synthesize).skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }
        if item.status != ContentStatus::AuditedPass {
            state.checkpoint.stage_mut(Stage::Synthesize).skipped += 1;
            return Ok(ItemOutcome::Skipped);
        }
        let script = item.script_text.expect("AuditedPass implies a script");
        let voice = self.personas[&key.persona].voice_reference.clone();

        let mut attempt = 0;
        let audio = loop {
            match self.tts.synthesize(&script, voice.as_deref()).await {
                Ok(bytes) => break bytes,
                Err(TtsFailure::Transient(msg)) if attempt < self.settings.tts_retries => {
                    attempt += 1;
                    tracing::warn!(key = %keystr, attempt, error = %msg, "TTS retry");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => return self.fail_item(state, Stage::Synthesize, key, e.to_string()),
            }
        };

        if let Err(e) = self.store.write_audio(key, &audio) {
            return self.fail_item(state, Stage::Synthesize, key, e.to_string());
        }
        state.checkpoint.mark_complete(Stage::Synthesize, &keystr);
        let stage = state.checkpoint.stage_mut(Stage::Synthesize);
        stage.processed += 1;
        stage.passed += 1;
        state.checkpoint.save(&self.checkpoint_path)?;
        Ok(ItemOutcome::Succeeded)
    }

    /// Record a per-item failure and keep going.
    fn fail_item(
        &self,
        state: &mut RunState,
        stage: Stage,
        key: &ContentKey,
        reason: String,
    ) -> Result<ItemOutcome, PipelineFatal> {
        tracing::warn!(key = %key, %stage, %reason, "item failed");
        let s = state.checkpoint.stage_mut(stage);
        s.processed += 1;
        s.failed += 1;
        state.failures.push((key.clone(), reason));
        state.checkpoint.save(&self.checkpoint_path)?;
        Ok(ItemOutcome::Failed)
    }
}
