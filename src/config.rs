//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory
//! (e.g. `~/.config/airwave/config.toml` on Linux) or at an explicit
//! `--config` path. Unlike most runtime state, configuration errors are
//! fatal at startup: a station with a nonsensical shift schedule or a
//! missing music directory must not come on air.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::model::{Persona, PersonaId};
use crate::schedule::{Shift, ShiftSchedule, ScheduleError};

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the music library; required at scan time
    pub music_dir: PathBuf,

    /// Root for catalog/rotation/content persistence; required
    pub content_root: PathBuf,

    #[serde(default)]
    pub station: StationConfig,

    #[serde(default)]
    pub rotation: RotationConfig,

    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub shows: Vec<ShowConfig>,

    pub personas: PersonasConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Station loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Controller loop quantum in milliseconds
    pub quantum_ms: u64,
    /// Tolerance in seconds for catching a :00/:30 announcement boundary
    pub announcement_window_secs: u32,
    /// How often to persist rotation counters during playback
    pub save_interval_secs: u64,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self { quantum_ms: 250, announcement_window_secs: 2, save_interval_secs: 300 }
    }
}

/// Rotation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Probability of drawing from the Core tier; must be in (0, 1)
    pub core_ratio: f64,
    /// Completed plays before a Discovery song graduates to Core
    pub graduation_threshold: u32,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self { core_ratio: 0.7, graduation_threshold: 5 }
    }
}

/// Shift schedule as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub shifts: Vec<ShiftEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftEntry {
    /// "HH:MM" time of day at which the shift starts
    pub start: String,
    pub persona: PersonaId,
}

/// Weather announcement windows (one hour each).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub morning_hour: u32,
    pub midday_hour: u32,
    pub evening_hour: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self { morning_hour: 7, midday_hour: 12, evening_hour: 18 }
    }
}

/// A scheduled radio show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShowConfig {
    /// Stable id; also the content-store target id
    pub id: String,
    pub title: String,
    /// Hour of day (0-23) at which the show is eligible
    pub hour: u32,
    /// Pre-produced show audio; the show is skipped when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<PathBuf>,
}

/// The two persona definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonasConfig {
    pub a: PersonaEntry,
    pub b: PersonaEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaEntry {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_reference: Option<PathBuf>,
    #[serde(default)]
    pub style: BTreeMap<String, String>,
}

/// Endpoints for the writer, auditor, and TTS backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    pub writer_url: String,
    pub auditor_url: String,
    pub tts_url: String,
    /// Per-request timeout for every backend call
    pub timeout_secs: u64,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self {
            writer_url: "http://127.0.0.1:8801/generate".to_string(),
            auditor_url: "http://127.0.0.1:8801/audit".to_string(),
            tts_url: "http://127.0.0.1:8802/synthesize".to_string(),
            timeout_secs: 120,
        }
    }
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Audit pass threshold on the 0-10 criterion scale
    pub pass_threshold: f64,
    /// Failed audits may re-enter Generate this many times per key
    pub regeneration_cap: u32,
    /// Transient-failure retries per item for the writer
    pub writer_retries: u32,
    /// Transient-failure retries per item for the auditor
    pub auditor_retries: u32,
    /// Transient-failure retries per item for TTS
    pub tts_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 7.0,
            regeneration_cap: 3,
            writer_retries: 2,
            auditor_retries: 2,
            tts_retries: 2,
        }
    }
}

impl Config {
    /// Load and validate configuration from `path`, or from the default
    /// location when `path` is None.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => default_config_path().ok_or(ConfigError::NoConfigDir)?,
        };
        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }
        let contents =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::Read(path.clone(), e))?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.clone(), e))?;
        config.validate()?;
        tracing::info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Validate cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ratio = self.rotation.core_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "rotation.core_ratio must be in (0, 1), got {}",
                ratio
            )));
        }
        if self.rotation.graduation_threshold == 0 {
            return Err(ConfigError::Invalid(
                "rotation.graduation_threshold must be positive".to_string(),
            ));
        }

        // Parses and checks ordering/overlap as a side effect.
        self.shift_schedule()?;

        let w = &self.weather;
        for hour in [w.morning_hour, w.midday_hour, w.evening_hour] {
            if hour > 23 {
                return Err(ConfigError::Invalid(format!("weather hour {} out of range", hour)));
            }
        }
        if w.morning_hour == w.midday_hour
            || w.midday_hour == w.evening_hour
            || w.morning_hour == w.evening_hour
        {
            return Err(ConfigError::Invalid("weather hours must be distinct".to_string()));
        }

        for show in &self.shows {
            if show.hour > 23 {
                return Err(ConfigError::Invalid(format!(
                    "show '{}' hour {} out of range",
                    show.id, show.hour
                )));
            }
            if show.id.is_empty() || show.id.contains(['/', '\\']) {
                return Err(ConfigError::Invalid(format!("show id '{}' is not usable", show.id)));
            }
        }

        Ok(())
    }

    /// Build the validated shift schedule.
    pub fn shift_schedule(&self) -> Result<ShiftSchedule, ConfigError> {
        let mut shifts = Vec::with_capacity(self.schedule.shifts.len());
        for entry in &self.schedule.shifts {
            let start = NaiveTime::parse_from_str(&entry.start, "%H:%M").map_err(|_| {
                ConfigError::Invalid(format!("shift start '{}' is not HH:MM", entry.start))
            })?;
            shifts.push(Shift { start, persona: entry.persona });
        }
        Ok(ShiftSchedule::new(shifts)?)
    }

    /// Materialize the two persona records.
    pub fn personas(&self) -> Vec<Persona> {
        let build = |id: PersonaId, entry: &PersonaEntry| Persona {
            id,
            display_name: entry.display_name.clone(),
            voice_reference: entry.voice_reference.clone(),
            style_card: entry.style.clone(),
        };
        vec![build(PersonaId::A, &self.personas.a), build(PersonaId::B, &self.personas.b)]
    }

    // Persisted state lives under the content root.

    pub fn catalog_path(&self) -> PathBuf {
        self.content_root.join("catalog.json")
    }

    pub fn rotation_path(&self) -> PathBuf {
        self.content_root.join("rotation.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.content_root.join("pipeline_state.json")
    }
}

/// Default config file location.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("airwave").join("config.toml"))
}

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("config file not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read config {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("failed to parse config {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;

    #[test]
    fn test_example_config_parses() {
        let toml = r#"
music_dir = "/music"
content_root = "/var/lib/airwave"

[schedule]
shifts = [
    { start = "06:00", persona = "a" },
    { start = "18:00", persona = "b" },
]

[personas.a]
display_name = "Marla"
[personas.a.style]
tone = "warm, late-night"

[personas.b]
display_name = "Chet"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.rotation.core_ratio, 0.7);
        assert_eq!(config.station.quantum_ms, 250);
        assert_eq!(config.personas().len(), 2);
        assert_eq!(config.personas()[0].style_card.get("tone").unwrap(), "warm, late-night");
    }

    #[test]
    fn test_bad_core_ratio_rejected() {
        let mut config = test_config("/tmp/none");
        config.rotation.core_ratio = 1.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("core_ratio"));
    }

    #[test]
    fn test_bad_shift_time_rejected() {
        let mut config = test_config("/tmp/none");
        config.schedule.shifts[0].start = "25:99".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_weather_hours_rejected() {
        let mut config = test_config("/tmp/none");
        config.weather.midday_hour = config.weather.morning_hour;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_paths_under_content_root() {
        let config = test_config("/data/station");
        assert_eq!(config.catalog_path(), PathBuf::from("/data/station/catalog.json"));
        assert_eq!(config.rotation_path(), PathBuf::from("/data/station/rotation.json"));
        assert_eq!(config.checkpoint_path(), PathBuf::from("/data/station/pipeline_state.json"));
    }
}
