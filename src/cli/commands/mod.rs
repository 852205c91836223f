//! CLI command definitions and dispatch.
//!
//! Exit codes are part of the operator contract:
//! - station: 0 clean shutdown, 1 missing/invalid catalog or configuration,
//!   2 fatal runtime error after startup.
//! - pipeline: 0 run completed (even with failed items), 1 invalid
//!   arguments, 2 unrecoverable failure.

mod pipeline;
mod scan;
mod station;

pub use pipeline::cmd_pipeline;
pub use scan::{cmd_scan, cmd_status};
pub use station::cmd_station;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Airwave: an AI radio station in a box.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config.toml (defaults to the OS config directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the station (plays the library with generated announcements)
    Station {
        /// Print the resolved configuration and exit
        #[arg(long)]
        dry_run: bool,
        /// Disable weather announcement windows
        #[arg(long)]
        no_weather: bool,
        /// Disable show windows
        #[arg(long)]
        no_shows: bool,
        /// Raise log verbosity
        #[arg(long)]
        debug: bool,
    },
    /// Run the content generation pipeline
    Pipeline {
        /// Generate song intros
        #[arg(long)]
        intros: bool,
        /// Generate song outros
        #[arg(long)]
        outros: bool,
        /// Generate the 48 half-hour time announcements
        #[arg(long)]
        time: bool,
        /// Generate the three weather announcements
        #[arg(long)]
        weather: bool,
        /// Generate show intros/outros
        #[arg(long)]
        shows: bool,
        /// Generate shift handoffs
        #[arg(long)]
        handoffs: bool,
        /// Generate every content type
        #[arg(long)]
        all_content: bool,
        /// Persona to generate for: all, a, or b
        #[arg(long, default_value = "all")]
        persona: String,
        /// Cap on song-like targets
        #[arg(long)]
        limit: Option<usize>,
        /// Shuffle order within the capped set
        #[arg(long)]
        random: bool,
        /// Run a single stage: generate, audit, synthesize, or all
        #[arg(long, default_value = "all")]
        stage: String,
        /// Shorthand for generate+audit without synthesis
        #[arg(long)]
        skip_audio: bool,
        /// Continue from the existing checkpoint
        #[arg(long)]
        resume: bool,
        /// Enumerate targets without calling any backend
        #[arg(long)]
        dry_run: bool,
        /// Test mode: deterministic fake auditor and fake TTS
        #[arg(long)]
        test: bool,
        /// Raise log verbosity
        #[arg(long)]
        verbose: bool,
    },
    /// Scan the music directory and build/update the catalog
    Scan {
        /// Directory to scan (defaults to music_dir from config)
        path: Option<PathBuf>,
        /// Discard the existing catalog instead of merging
        #[arg(long)]
        rebuild: bool,
    },
    /// Print content-store completeness per content type and persona
    Status,
}

/// Dispatch a parsed command line; returns the process exit code.
pub fn run(cli: Cli) -> u8 {
    let verbose = match &cli.command {
        Commands::Station { debug, .. } => *debug,
        Commands::Pipeline { verbose, .. } => *verbose,
        _ => false,
    };
    init_logging(verbose);

    let result = match cli.command {
        Commands::Station { dry_run, no_weather, no_shows, debug: _ } => {
            cmd_station(cli.config.as_deref(), dry_run, no_weather, no_shows)
        }
        Commands::Pipeline {
            intros,
            outros,
            time,
            weather,
            shows,
            handoffs,
            all_content,
            persona,
            limit,
            random,
            stage,
            skip_audio,
            resume,
            dry_run,
            test,
            verbose: _,
        } => cmd_pipeline(
            cli.config.as_deref(),
            pipeline::PipelineArgs {
                intros,
                outros,
                time,
                weather,
                shows,
                handoffs,
                all_content,
                persona,
                limit,
                random,
                stage,
                skip_audio,
                resume,
                dry_run,
                test,
            },
        ),
        Commands::Scan { path, rebuild } => {
            cmd_scan(cli.config.as_deref(), path.as_deref(), rebuild)
        }
        Commands::Status => cmd_status(cli.config.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            2
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    let default_level = if verbose { "airwave=debug" } else { "airwave=info" };
    let filter = EnvFilter::from_default_env()
        .add_directive(default_level.parse().expect("static directive parses"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
