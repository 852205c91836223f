//! Deterministic target enumeration.
//!
//! A pipeline run works through a fixed, ordered list of targets so that
//! checkpoints and resumes agree on what "item #5" means. Content types
//! enumerate in declaration order, personas in selection order, songs in
//! catalog (id) order, and clock slots chronologically. Caps apply after
//! ordering; `--random` shuffles within the capped set only.

use chrono::NaiveTime;
use rand::Rng;
use rand::seq::SliceRandom;

use crate::catalog::Catalog;
use crate::config::ShowConfig;
use crate::model::{ContentKey, ContentType, PersonaId, SongId, Tier, WeatherWindow};
use crate::rotation::RotationEngine;
use crate::schedule::ShiftSchedule;

/// What a batch run covers.
#[derive(Debug, Clone)]
pub struct TargetSelection {
    pub content_types: Vec<ContentType>,
    pub personas: Vec<PersonaId>,
    /// Cap on song-like targets, applied per content type and persona
    pub limit: Option<usize>,
    /// Shuffle song-like targets within the capped set
    pub shuffle: bool,
}

/// One unit of pipeline work.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub key: ContentKey,
    pub subject: TargetSubject,
}

/// What the target's brief will be about; resolved lazily at Generate time.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetSubject {
    Song(SongId),
    TimeSlot(NaiveTime),
    Weather(WeatherWindow),
    Show { title: String },
    Handoff { to: PersonaId, at: NaiveTime },
}

/// Enumerate the ordered target list for a selection.
pub fn enumerate_targets(
    selection: &TargetSelection,
    catalog: &Catalog,
    rotation: &RotationEngine,
    schedule: &ShiftSchedule,
    shows: &[ShowConfig],
    rng: &mut impl Rng,
) -> Vec<Target> {
    let mut targets = Vec::new();

    for &content_type in ContentType::ALL.iter() {
        if !selection.content_types.contains(&content_type) {
            continue;
        }
        for &persona in &selection.personas {
            match content_type {
                ContentType::SongIntro | ContentType::SongOutro => {
                    let mut songs: Vec<&SongId> = catalog
                        .all_songs()
                        .filter(|s| {
                            rotation.tier_of(&s.id).map(|t| t != Tier::Banished).unwrap_or(true)
                        })
                        .map(|s| &s.id)
                        .collect();
                    if let Some(limit) = selection.limit {
                        songs.truncate(limit);
                    }
                    if selection.shuffle {
                        songs.shuffle(rng);
                    }
                    for id in songs {
                        targets.push(Target {
                            key: ContentKey::new(content_type, persona, id.as_str()),
                            subject: TargetSubject::Song(id.clone()),
                        });
                    }
                }
                ContentType::TimeAnnouncement => {
                    for hour in 0..24 {
                        for minute in [0u32, 30] {
                            let slot = NaiveTime::from_hms_opt(hour, minute, 0)
                                .expect("hour/minute are in range");
                            targets.push(Target {
                                key: ContentKey::new(
                                    content_type,
                                    persona,
                                    format!("{:02}-{:02}", hour, minute),
                                ),
                                subject: TargetSubject::TimeSlot(slot),
                            });
                        }
                    }
                }
                ContentType::WeatherAnnouncement => {
                    for window in WeatherWindow::ALL {
                        targets.push(Target {
                            key: ContentKey::new(content_type, persona, window.as_str()),
                            subject: TargetSubject::Weather(window),
                        });
                    }
                }
                ContentType::ShowIntro | ContentType::ShowOutro => {
                    // A show belongs to whichever persona hosts its hour.
                    for show in shows {
                        let host = schedule.persona_at(
                            NaiveTime::from_hms_opt(show.hour, 0, 0)
                                .expect("show hour validated at config load"),
                        );
                        if host != persona {
                            continue;
                        }
                        targets.push(Target {
                            key: ContentKey::new(content_type, persona, show.id.as_str()),
                            subject: TargetSubject::Show { title: show.title.clone() },
                        });
                    }
                }
                ContentType::Handoff => {
                    // The outgoing persona voices the handoff.
                    for (at, outgoing, incoming) in schedule.transitions() {
                        if outgoing != persona {
                            continue;
                        }
                        targets.push(Target {
                            key: ContentKey::new(
                                content_type,
                                persona,
                                at.format("%H-%M").to_string(),
                            ),
                            subject: TargetSubject::Handoff { to: incoming, at },
                        });
                    }
                }
            }
        }
    }
    targets
}
