//! Test fixtures shared across the crate's test modules.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveTime;

use crate::catalog::Catalog;
use crate::config::{
    BackendsConfig, Config, PersonaEntry, PersonasConfig, PipelineConfig, RotationConfig,
    ScheduleConfig, ShiftEntry, StationConfig, WeatherConfig,
};
use crate::content::{AuditRecord, ContentStore};
use crate::model::{ContentKey, Persona, PersonaId, Song, WeatherWindow};
use crate::player::{Player, PlayerEvent};
use crate::schedule::{Calendar, Shift, ShiftSchedule};

/// A song with a synthetic file reference. The file does not exist; use
/// [`playable_song`] when a sink will check.
pub fn song(artist: &str, title: &str, duration_seconds: u64) -> Song {
    let file = format!("/music/{}/{}.mp3", artist.to_lowercase(), title.to_lowercase());
    Song::new(artist, title, duration_seconds, file)
}

/// A song whose file actually exists under `dir`.
pub fn playable_song(dir: &Path, artist: &str, title: &str, duration_seconds: u64) -> Song {
    let file = dir.join(format!("{}-{}.mp3", artist.to_lowercase(), title.to_lowercase()));
    std::fs::write(&file, b"fake audio bytes").expect("failed to write fixture file");
    Song::new(artist, title, duration_seconds, file)
}

/// A catalog of `n` distinct songs (synthetic paths).
pub fn test_catalog(n: usize) -> Catalog {
    let mut catalog = Catalog::new();
    for i in 0..n {
        catalog.add_song(song("The Fixtures", &format!("Track {:02}", i), 180 + i as u64));
    }
    catalog
}

/// The standard two-shift schedule: A from 06:00, B from 18:00.
pub fn test_schedule() -> ShiftSchedule {
    ShiftSchedule::new(vec![
        Shift { start: NaiveTime::from_hms_opt(6, 0, 0).unwrap(), persona: PersonaId::A },
        Shift { start: NaiveTime::from_hms_opt(18, 0, 0).unwrap(), persona: PersonaId::B },
    ])
    .unwrap()
}

/// Calendar over [`test_schedule`] with a 2-second announcement window and
/// default weather hours.
pub fn test_calendar() -> Calendar {
    Calendar::new(
        test_schedule(),
        2,
        [(WeatherWindow::Morning, 7), (WeatherWindow::Midday, 12), (WeatherWindow::Evening, 18)],
        Vec::new(),
    )
}

pub fn test_persona(id: PersonaId) -> Persona {
    let display_name = match id {
        PersonaId::A => "Marla",
        PersonaId::B => "Chet",
    };
    Persona {
        id,
        display_name: display_name.to_string(),
        voice_reference: None,
        style_card: BTreeMap::new(),
    }
}

pub fn test_personas() -> Vec<Persona> {
    vec![test_persona(PersonaId::A), test_persona(PersonaId::B)]
}

/// A validated config pointing everything at `root`.
pub fn test_config(root: &str) -> Config {
    Config {
        music_dir: format!("{}/music", root).into(),
        content_root: root.into(),
        station: StationConfig::default(),
        rotation: RotationConfig::default(),
        schedule: ScheduleConfig {
            shifts: vec![
                ShiftEntry { start: "06:00".to_string(), persona: PersonaId::A },
                ShiftEntry { start: "18:00".to_string(), persona: PersonaId::B },
            ],
        },
        weather: WeatherConfig::default(),
        shows: Vec::new(),
        personas: PersonasConfig {
            a: PersonaEntry {
                display_name: "Marla".to_string(),
                voice_reference: None,
                style: BTreeMap::new(),
            },
            b: PersonaEntry {
                display_name: "Chet".to_string(),
                voice_reference: None,
                style: BTreeMap::new(),
            },
        },
        backends: BackendsConfig::default(),
        pipeline: PipelineConfig::default(),
    }
}

/// An audit that clears the default threshold.
pub fn passing_audit() -> AuditRecord {
    AuditRecord {
        overall_score: 8.4,
        passed: true,
        criteria_scores: BTreeMap::from([
            ("persona_fit".to_string(), 8.0),
            ("naturalness".to_string(), 9.0),
            ("brevity".to_string(), 8.0),
            ("accuracy".to_string(), 8.5),
            ("energy".to_string(), 8.5),
        ]),
        issues: Vec::new(),
        notes: "fixture audit".to_string(),
        raw_response: "{}".to_string(),
    }
}

/// An audit below the default threshold.
pub fn failing_audit() -> AuditRecord {
    AuditRecord {
        overall_score: 3.1,
        passed: false,
        criteria_scores: BTreeMap::from([
            ("persona_fit".to_string(), 3.0),
            ("brevity".to_string(), 3.2),
        ]),
        issues: vec!["breaks character".to_string()],
        notes: "fixture audit".to_string(),
        raw_response: "{}".to_string(),
    }
}

/// Write script + passing audit + audio for a key, making it playable.
pub fn write_ready_item(store: &ContentStore, key: &ContentKey, text: &str) {
    store.write_script(key, text).expect("write script");
    store.write_audit(key, &passing_audit()).expect("write audit");
    store.write_audio(key, b"RIFF fixture audio").expect("write audio");
}

/// Poll the player until an event matching `pred` arrives (or panic after a
/// generous timeout). Returns everything drained along the way.
pub fn wait_for_event(
    player: &Player,
    pred: impl Fn(&PlayerEvent) -> bool,
) -> Vec<PlayerEvent> {
    let mut seen = Vec::new();
    for _ in 0..500 {
        for event in player.poll_events() {
            let hit = pred(&event);
            seen.push(event);
            if hit {
                return seen;
            }
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    panic!("timed out waiting for player event; saw {:?}", seen);
}
