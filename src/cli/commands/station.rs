//! The `station` subcommand: assemble and run the live station.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::content::ContentStore;
use crate::model::WeatherWindow;
use crate::player::{AudioSink, MpvSink, Player, TimerSink};
use crate::rotation::RotationEngine;
use crate::schedule::Calendar;
use crate::station::{CommandBuffer, Station, StationOptions, StationParams, spawn_key_reader};

pub fn cmd_station(
    config_path: Option<&Path>,
    dry_run: bool,
    no_weather: bool,
    no_shows: bool,
) -> anyhow::Result<u8> {
    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return Ok(1);
        }
    };

    if dry_run {
        println!("{}", toml::to_string_pretty(&config)?);
        return Ok(0);
    }

    let calendar = build_calendar(&config)?;

    let (catalog, rotation) = match load_state(&config) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("startup error: {} (run `airwave scan` first)", e);
            return Ok(1);
        }
    };
    if catalog.is_empty() {
        eprintln!("catalog is empty; run `airwave scan` first");
        return Ok(1);
    }

    // Real audio when mpv is available; a silent timer sink otherwise so
    // the station logic still runs on audio-less machines.
    let sink: Box<dyn AudioSink> = match MpvSink::new() {
        Ok(sink) => Box::new(sink),
        Err(e) => {
            tracing::warn!(error = %e, "falling back to silent playback");
            Box::new(TimerSink::new())
        }
    };

    let commands = CommandBuffer::new(16);
    let stop_keys = Arc::new(AtomicBool::new(false));
    // No TTY (service environments) just means no keyboard commands.
    let key_thread = match spawn_key_reader(commands.clone(), stop_keys.clone()) {
        Ok(thread) => Some(thread),
        Err(e) => {
            tracing::warn!(error = %e, "keyboard unavailable; running without operator keys");
            None
        }
    };

    let station = Station::new(StationParams {
        catalog,
        rotation,
        store: ContentStore::new(&config.content_root),
        calendar,
        personas: config.personas(),
        shows: config.shows.clone(),
        player: Player::spawn(sink),
        commands,
        clock: Box::new(|| chrono::Local::now().naive_local()),
        options: StationOptions {
            no_weather,
            no_shows,
            quantum: Duration::from_millis(config.station.quantum_ms),
            save_interval: Duration::from_secs(config.station.save_interval_secs),
        },
        catalog_path: config.catalog_path(),
        rotation_path: config.rotation_path(),
        rng_seed: None,
    });

    // A panic past this point is a fatal runtime error (exit 2), not a
    // configuration problem.
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| station.run()));

    stop_keys.store(true, Ordering::SeqCst);
    if let Some(thread) = key_thread {
        let _ = thread.join();
    }

    match outcome {
        Ok(()) => Ok(0),
        Err(_) => {
            eprintln!("fatal runtime error; see log for details");
            Ok(2)
        }
    }
}

/// Load the persisted station state. Failure here is a startup error, not
/// a runtime one.
fn load_state(config: &Config) -> crate::error::Result<(Catalog, RotationEngine)> {
    let catalog = Catalog::load(&config.catalog_path())?;
    let rotation = RotationEngine::load(
        &config.rotation_path(),
        config.rotation.core_ratio,
        config.rotation.graduation_threshold,
    )?;
    Ok((catalog, rotation))
}

pub(crate) fn build_calendar(config: &Config) -> anyhow::Result<Calendar> {
    let schedule = config.shift_schedule()?;
    Ok(Calendar::new(
        schedule,
        config.station.announcement_window_secs,
        [
            (WeatherWindow::Morning, config.weather.morning_hour),
            (WeatherWindow::Midday, config.weather.midday_hour),
            (WeatherWindow::Evening, config.weather.evening_hour),
        ],
        config.shows.iter().map(|s| (s.id.clone(), s.hour)).collect(),
    ))
}
