//! Writer brief construction.
//!
//! A brief is everything the writer model needs for one script: the persona
//! voice (system text built from the style card) and the concrete ask
//! (prompt built from catalog metadata and contextual facts). Construction
//! is a pure function so the same inputs always produce the same brief.

use chrono::{NaiveTime, Timelike};

use crate::model::{ContentType, Persona, PersonaId, Song, WeatherWindow};

/// Input to one writer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Brief {
    pub persona: PersonaId,
    pub content_type: ContentType,
    /// Content-store target id; carried for logging and bookkeeping
    pub target: String,
    /// Persona voice and ground rules
    pub system: String,
    /// The concrete ask
    pub prompt: String,
}

/// What a brief is about.
#[derive(Debug, Clone)]
pub enum BriefSubject<'a> {
    Song(&'a Song),
    TimeSlot(NaiveTime),
    Weather(WeatherWindow),
    Show { title: &'a str },
    Handoff { to: &'a str, at: NaiveTime },
}

/// Build the brief for one target.
pub fn build_brief(
    content_type: ContentType,
    persona: &Persona,
    target_id: &str,
    subject: &BriefSubject<'_>,
) -> Brief {
    Brief {
        persona: persona.id,
        content_type,
        target: target_id.to_string(),
        system: system_text(persona),
        prompt: prompt_text(content_type, persona, subject),
    }
}

fn system_text(persona: &Persona) -> String {
    let mut out = format!(
        "You are {}, an on-air radio DJ. Write exactly what you would say on air: \
         one short spoken passage, no stage directions, no emoji, no commentary \
         about the task.",
        persona.display_name
    );
    for (key, value) in &persona.style_card {
        out.push_str(&format!("\n{}: {}", key, value));
    }
    out
}

fn prompt_text(content_type: ContentType, persona: &Persona, subject: &BriefSubject<'_>) -> String {
    match (content_type, subject) {
        (ContentType::SongIntro, BriefSubject::Song(song)) => {
            let mut out = format!(
                "Introduce the next song: \"{}\" by {}.",
                song.title, song.artist
            );
            if let Some(year) = song.year {
                out.push_str(&format!(" It came out in {}.", year));
            }
            if let Some(album) = &song.album {
                out.push_str(&format!(" It's from the album \"{}\".", album));
            }
            out.push_str(" Two or three sentences, then get out of the way.");
            out
        }
        (ContentType::SongOutro, BriefSubject::Song(song)) => format!(
            "That was \"{}\" by {}. Write a one- or two-sentence back-announce \
             before moving on.",
            song.title, song.artist
        ),
        (ContentType::TimeAnnouncement, BriefSubject::TimeSlot(slot)) => format!(
            "Give a quick time check: it is {}. It is {} right now. One or two \
             sentences, no weather, no song talk.",
            spoken_time(*slot),
            day_part(slot.hour()),
        ),
        (ContentType::WeatherAnnouncement, BriefSubject::Weather(window)) => format!(
            "Deliver the {} weather update. Keep it loose and conversational; \
             the producer will splice in the actual numbers. Three sentences at most.",
            window
        ),
        (ContentType::ShowIntro, BriefSubject::Show { title }) => format!(
            "Open your show \"{}\". Welcome listeners and tease what's coming. \
             Three sentences at most.",
            title
        ),
        (ContentType::ShowOutro, BriefSubject::Show { title }) => format!(
            "Close out your show \"{}\". Thank listeners and sign off. Two \
             sentences at most.",
            title
        ),
        (ContentType::Handoff, BriefSubject::Handoff { to, at }) => format!(
            "Your shift ends at {}. Hand the microphone to {}, who is up next. \
             Two sentences: wrap up, then introduce them warmly.",
            spoken_time(*at),
            to
        ),
        // Enumeration always pairs a content type with its matching subject;
        // a mismatch is a bug worth hearing about in the script itself.
        (ct, _) => format!(
            "Say one short line appropriate for a {} segment, {}.",
            ct, persona.display_name
        ),
    }
}

/// "7 o'clock", "7:30", "noon", "midnight".
fn spoken_time(t: NaiveTime) -> String {
    let hour12 = match t.hour() % 12 {
        0 => 12,
        h => h,
    };
    match (t.hour(), t.minute()) {
        (0, 0) => "midnight".to_string(),
        (12, 0) => "noon".to_string(),
        (h, 0) => format!("{} o'clock in the {}", hour12, day_part(h)),
        (h, m) => format!("{}:{:02} in the {}", hour12, m, day_part(h)),
    }
}

fn day_part(hour: u32) -> &'static str {
    match hour {
        0..=4 => "small hours",
        5..=11 => "morning",
        12..=16 => "afternoon",
        17..=20 => "evening",
        _ => "night",
    }
}
