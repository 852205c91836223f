//! Core data models for the station.
//!
//! Defines the primary entities shared across the catalog, rotation engine,
//! content store, pipeline, and station controller: [`Song`], [`Persona`],
//! [`ContentType`], and [`ContentKey`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Stable, opaque identifier for a song.
///
/// Derived from the normalized `artist|title` pair, so rescanning the same
/// file always yields the same id, while a retagged artist yields a new one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SongId(String);

impl SongId {
    /// Derive the id for an artist/title pair.
    ///
    /// The id is a filesystem-safe slug plus a short hash of the normalized
    /// pair. The hash keeps ids unique even when two slugs collide after
    /// character stripping.
    pub fn derive(artist: &str, title: &str) -> Self {
        let normalized = format!("{}|{}", normalize(artist), normalize(title));
        let digest = Sha256::digest(normalized.as_bytes());
        let hash: String = digest.iter().take(5).map(|b| format!("{:02x}", b)).collect();

        let mut slug = slugify(&normalized);
        slug.truncate(48);
        let slug = slug.trim_end_matches('-');
        SongId(format!("{}-{}", slug, hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SongId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SongId {
    fn from(s: &str) -> Self {
        SongId(s.to_string())
    }
}

/// Lowercase, trim, and collapse internal whitespace.
fn normalize(s: &str) -> String {
    s.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reduce a string to lowercase ASCII alphanumerics and single dashes.
fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_dash = true;
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out
}

/// A song in the music library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Stable id derived from artist/title
    pub id: SongId,
    pub artist: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Duration in whole seconds; always > 0 for a valid song
    pub duration_seconds: u64,
    /// Path to the audio file; resolvability is checked at play time
    pub file_reference: PathBuf,
}

impl Song {
    pub fn new(
        artist: impl Into<String>,
        title: impl Into<String>,
        duration_seconds: u64,
        file_reference: impl Into<PathBuf>,
    ) -> Self {
        let artist = artist.into();
        let title = title.into();
        Self {
            id: SongId::derive(&artist, &title),
            artist,
            title,
            album: None,
            year: None,
            duration_seconds,
            file_reference: file_reference.into(),
        }
    }

    /// Display label, e.g. "Artist - Title".
    pub fn display_label(&self) -> String {
        format!("{} - {}", self.artist, self.title)
    }
}

/// On-air identity. A closed set: the station runs exactly two DJs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonaId {
    A,
    B,
}

impl PersonaId {
    pub const ALL: [PersonaId; 2] = [PersonaId::A, PersonaId::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaId::A => "a",
            PersonaId::B => "b",
        }
    }

    /// The other persona; used for shift handoffs.
    pub fn other(&self) -> PersonaId {
        match self {
            PersonaId::A => PersonaId::B,
            PersonaId::B => PersonaId::A,
        }
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonaId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "a" => Ok(PersonaId::A),
            "b" => Ok(PersonaId::B),
            other => Err(format!("unknown persona '{}'", other)),
        }
    }
}

/// A DJ persona: voice reference plus the style card the script builder
/// feeds to the writer model. Loaded once at startup, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    pub display_name: String,
    /// Reference audio for voice cloning; optional until TTS is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_reference: Option<PathBuf>,
    /// Opaque style hints (tone, catchphrases, eras...) consumed by the
    /// brief builder; keys and values are free-form
    #[serde(default)]
    pub style_card: BTreeMap<String, String>,
}

/// Rotation class of a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Heavy rotation
    Core,
    /// Light rotation; new songs start here
    Discovery,
    /// Never selected; terminal until an explicit restore
    Banished,
}

/// The closed set of generated content kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    SongIntro,
    SongOutro,
    TimeAnnouncement,
    WeatherAnnouncement,
    ShowIntro,
    ShowOutro,
    Handoff,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::SongIntro,
        ContentType::SongOutro,
        ContentType::TimeAnnouncement,
        ContentType::WeatherAnnouncement,
        ContentType::ShowIntro,
        ContentType::ShowOutro,
        ContentType::Handoff,
    ];

    /// Directory name under the content root; filesystem-safe.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::SongIntro => "song_intro",
            ContentType::SongOutro => "song_outro",
            ContentType::TimeAnnouncement => "time",
            ContentType::WeatherAnnouncement => "weather",
            ContentType::ShowIntro => "show_intro",
            ContentType::ShowOutro => "show_outro",
            ContentType::Handoff => "handoff",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentType::ALL
            .iter()
            .find(|ct| ct.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown content type '{}'", s))
    }
}

/// One of the three configured weather slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherWindow {
    Morning,
    Midday,
    Evening,
}

impl WeatherWindow {
    pub const ALL: [WeatherWindow; 3] =
        [WeatherWindow::Morning, WeatherWindow::Midday, WeatherWindow::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherWindow::Morning => "morning",
            WeatherWindow::Midday => "midday",
            WeatherWindow::Evening => "evening",
        }
    }
}

impl fmt::Display for WeatherWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Globally unique address of a content item.
///
/// `target_id` is a song id for intros/outros, a clock slot (`HH-MM`) for
/// time announcements and handoffs, a weather window name, or a show id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub content_type: ContentType,
    pub persona: PersonaId,
    pub target_id: String,
}

impl ContentKey {
    pub fn new(
        content_type: ContentType,
        persona: PersonaId,
        target_id: impl Into<String>,
    ) -> Self {
        Self { content_type, persona, target_id: target_id.into() }
    }

    /// Relative directory under the content root.
    pub fn rel_dir(&self) -> PathBuf {
        PathBuf::from(self.content_type.as_str())
            .join(self.persona.as_str())
            .join(&self.target_id)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.content_type, self.persona, self.target_id)
    }
}
