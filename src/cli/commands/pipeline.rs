//! The `pipeline` subcommand: run the content build batch.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime::Runtime;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::content::ContentStore;
use crate::gatekeeper::Gatekeeper;
use crate::model::{ContentType, PersonaId};
use crate::pipeline::checkpoint::{OrderingMode, Stage};
use crate::pipeline::clients::{
    AuditorClient, FakeAuditor, FakeTts, HttpAuditorClient, HttpTtsClient, HttpWriterClient,
    TtsClient,
};
use crate::pipeline::progress::TerminalProgress;
use crate::pipeline::{
    BatchConfig, Orchestrator, RunMode, StageFilter, TargetSelection,
};
use crate::rotation::RotationEngine;

/// Fallback song cap in test mode, so `--test` stays small by default.
const TEST_MODE_LIMIT: usize = 3;

/// Parsed `pipeline` flags.
pub struct PipelineArgs {
    pub intros: bool,
    pub outros: bool,
    pub time: bool,
    pub weather: bool,
    pub shows: bool,
    pub handoffs: bool,
    pub all_content: bool,
    pub persona: String,
    pub limit: Option<usize>,
    pub random: bool,
    pub stage: String,
    pub skip_audio: bool,
    pub resume: bool,
    pub dry_run: bool,
    pub test: bool,
}

pub fn cmd_pipeline(config_path: Option<&Path>, args: PipelineArgs) -> anyhow::Result<u8> {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return Ok(2);
        }
    };

    let Some(content_types) = selected_content_types(&args) else {
        eprintln!(
            "no content selected; pass one or more of --intros --outros --time \
             --weather --shows --handoffs, or --all-content"
        );
        return Ok(1);
    };
    let personas = match args.persona.as_str() {
        "all" => PersonaId::ALL.to_vec(),
        other => match other.parse::<PersonaId>() {
            Ok(p) => vec![p],
            Err(e) => {
                eprintln!("invalid --persona: {}", e);
                return Ok(1);
            }
        },
    };
    let stage_filter = match parse_stage_filter(&args) {
        Some(filter) => filter,
        None => {
            eprintln!("invalid --stage '{}'; expected generate|audit|synthesize|all", args.stage);
            return Ok(1);
        }
    };

    let catalog = match Catalog::load(&config.catalog_path()) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("catalog error: {} (run `airwave scan` first)", e);
            return Ok(2);
        }
    };
    let mut rotation = RotationEngine::load(
        &config.rotation_path(),
        config.rotation.core_ratio,
        config.rotation.graduation_threshold,
    )?;
    rotation.sync_catalog(&catalog);
    let schedule = config.shift_schedule()?;

    let mode = if args.test { RunMode::Test } else { RunMode::Production };
    let limit = match (args.limit, mode) {
        (None, RunMode::Test) => Some(TEST_MODE_LIMIT),
        (limit, _) => limit,
    };
    let batch = BatchConfig {
        selection: TargetSelection {
            content_types,
            personas,
            limit,
            shuffle: args.random,
        },
        stage_filter,
        mode,
        ordering: match mode {
            RunMode::Test => OrderingMode::ItemMajor,
            RunMode::Production => OrderingMode::StageMajor,
        },
        resume: args.resume,
        dry_run: args.dry_run,
        seed: None,
    };

    let timeout = config.backends.timeout_secs;
    let threshold = config.pipeline.pass_threshold;
    let writer = Arc::new(HttpWriterClient::new(&config.backends.writer_url, timeout));
    let auditor: Arc<dyn AuditorClient> = if args.test {
        Arc::new(FakeAuditor::new(threshold))
    } else {
        Arc::new(HttpAuditorClient::new(&config.backends.auditor_url, timeout, threshold))
    };
    let tts: Arc<dyn TtsClient> = if args.test {
        Arc::new(FakeTts)
    } else {
        Arc::new(HttpTtsClient::new(&config.backends.tts_url, timeout))
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let orchestrator = Orchestrator::new(
        ContentStore::new(&config.content_root),
        Gatekeeper::new(),
        writer,
        auditor,
        tts,
        config.pipeline.clone(),
        config.personas(),
        config.checkpoint_path(),
        Arc::new(TerminalProgress),
        cancel.clone(),
    );

    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        // Ctrl-C finishes the in-flight item, then the run returns cleanly.
        let cancel_on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received; finishing the current item");
                cancel_on_interrupt.store(true, Ordering::SeqCst);
            }
        });
        orchestrator.run(&batch, &catalog, &rotation, &schedule, &config.shows).await
    });

    match result {
        Ok(summary) => {
            if batch.dry_run {
                for key in &summary.planned {
                    println!("{}", key);
                }
                println!("{} targets", summary.planned.len());
                return Ok(0);
            }
            print!("{}", summary.render());
            Ok(if summary.completed { 0 } else { 2 })
        }
        Err(e) => {
            eprintln!("pipeline failed: {}", e);
            Ok(2)
        }
    }
}

fn selected_content_types(args: &PipelineArgs) -> Option<Vec<ContentType>> {
    if args.all_content {
        return Some(ContentType::ALL.to_vec());
    }
    let mut selected = Vec::new();
    let flags = [
        (args.intros, vec![ContentType::SongIntro]),
        (args.outros, vec![ContentType::SongOutro]),
        (args.time, vec![ContentType::TimeAnnouncement]),
        (args.weather, vec![ContentType::WeatherAnnouncement]),
        (args.shows, vec![ContentType::ShowIntro, ContentType::ShowOutro]),
        (args.handoffs, vec![ContentType::Handoff]),
    ];
    for (on, types) in flags {
        if on {
            selected.extend(types);
        }
    }
    if selected.is_empty() { None } else { Some(selected) }
}

fn parse_stage_filter(args: &PipelineArgs) -> Option<StageFilter> {
    if args.skip_audio {
        return Some(StageFilter::SkipAudio);
    }
    match args.stage.as_str() {
        "all" => Some(StageFilter::All),
        "generate" => Some(StageFilter::Only(Stage::Generate)),
        "audit" => Some(StageFilter::Only(Stage::Audit)),
        "synthesize" => Some(StageFilter::Only(Stage::Synthesize)),
        _ => None,
    }
}
