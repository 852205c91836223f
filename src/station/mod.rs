//! The station controller.
//!
//! A cooperative loop that composes the clock, catalog, rotation engine,
//! content store, and player into an always-on radio station. Each tick it
//! reacts to player events, drains operator commands, checks the calendar
//! for announcement windows, and keeps the queue fed. All mutation of the
//! catalog, rotation records, and queue happens on this one thread; the
//! player and keyboard talk to it over channels.

pub mod commands;
pub mod status;

pub use commands::{CommandBuffer, StationCommand, command_for_key, spawn_key_reader};
pub use status::StatusSnapshot;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveDateTime};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::catalog::Catalog;
use crate::config::ShowConfig;
use crate::content::ContentStore;
use crate::model::{ContentKey, ContentType, Persona, PersonaId, SongId, WeatherWindow};
use crate::player::{
    PlaybackQueue, PlaybackState, Player, PlayerEvent, QueueItem, QueueItemKind,
};
use crate::rotation::RotationEngine;
use crate::schedule::Calendar;

/// Injected time source; tests substitute a fake.
pub type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// Station runtime options.
#[derive(Debug, Clone)]
pub struct StationOptions {
    pub no_weather: bool,
    pub no_shows: bool,
    /// Controller loop quantum
    pub quantum: Duration,
    /// How often rotation/catalog state is persisted
    pub save_interval: Duration,
}

impl Default for StationOptions {
    fn default() -> Self {
        Self {
            no_weather: false,
            no_shows: false,
            quantum: Duration::from_millis(250),
            save_interval: Duration::from_secs(300),
        }
    }
}

/// Everything the controller composes.
pub struct StationParams {
    pub catalog: Catalog,
    pub rotation: RotationEngine,
    pub store: ContentStore,
    pub calendar: Calendar,
    pub personas: Vec<Persona>,
    pub shows: Vec<ShowConfig>,
    pub player: Player,
    pub commands: Arc<CommandBuffer>,
    pub clock: Clock,
    pub options: StationOptions,
    pub catalog_path: PathBuf,
    pub rotation_path: PathBuf,
    /// Seeded in tests for reproducible song selection
    pub rng_seed: Option<u64>,
}

/// The long-running controller.
pub struct Station {
    catalog: Catalog,
    rotation: RotationEngine,
    store: ContentStore,
    calendar: Calendar,
    personas: BTreeMap<PersonaId, Persona>,
    shows: Vec<ShowConfig>,
    player: Player,
    queue: PlaybackQueue,
    commands: Arc<CommandBuffer>,
    clock: Clock,
    options: StationOptions,
    catalog_path: PathBuf,
    rotation_path: PathBuf,
    rng: StdRng,

    // Window bookkeeping
    last_announcement_slot: Option<String>,
    weather_played: HashMap<WeatherWindow, NaiveDate>,
    show_played_on: Option<NaiveDate>,

    // Current-item tracking (set from player events)
    current_song: Option<SongId>,
    current_intro_key: Option<ContentKey>,
    /// Play sent, Started/Error not yet observed
    awaiting_start: bool,

    started_at: Instant,
    next_save: Instant,
    songs_played: u64,
    error_count: u64,
    message: Option<String>,
    /// A state save failed; mutations are refused until one succeeds
    persist_blocked: bool,
    shutdown_requested: bool,

    #[cfg(test)]
    pub(crate) completed_log: Vec<QueueItem>,
}

impl Station {
    pub fn new(params: StationParams) -> Self {
        let mut rotation = params.rotation;
        rotation.sync_catalog(&params.catalog);
        let rng = match params.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let next_save = Instant::now() + params.options.save_interval;
        Self {
            catalog: params.catalog,
            rotation,
            store: params.store,
            calendar: params.calendar,
            personas: params.personas.into_iter().map(|p| (p.id, p)).collect(),
            shows: params.shows,
            player: params.player,
            queue: PlaybackQueue::new(),
            commands: params.commands,
            clock: params.clock,
            options: params.options,
            catalog_path: params.catalog_path,
            rotation_path: params.rotation_path,
            rng,
            last_announcement_slot: None,
            weather_played: HashMap::new(),
            show_played_on: None,
            current_song: None,
            current_intro_key: None,
            awaiting_start: false,
            started_at: Instant::now(),
            next_save,
            songs_played: 0,
            error_count: 0,
            message: None,
            persist_blocked: false,
            shutdown_requested: false,
            #[cfg(test)]
            completed_log: Vec::new(),
        }
    }

    /// Run until the operator quits.
    pub fn run(mut self) {
        tracing::info!("station on air");
        loop {
            if !self.tick() {
                break;
            }
            std::thread::sleep(self.options.quantum);
        }

        // Graceful shutdown: cut the current item, give in-flight
        // notifications a short grace period, persist, and leave.
        let _ = self.player.stop();
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if self.player.poll_events().is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        self.persist();
        tracing::info!(songs = self.songs_played, errors = self.error_count, "station off air");
    }

    /// One controller iteration. Returns false once shutdown is requested.
    pub fn tick(&mut self) -> bool {
        let now = (self.clock)();

        for event in self.player.poll_events() {
            self.handle_player_event(event, now);
        }

        for command in self.commands.drain() {
            self.apply_command(command);
        }

        if self.shutdown_requested {
            return false;
        }

        self.check_windows(now);

        if self.player.state() == PlaybackState::Stopped && !self.awaiting_start {
            self.advance(now);
        }

        if Instant::now() >= self.next_save {
            self.persist();
            self.next_save = Instant::now() + self.options.save_interval;
        }
        true
    }

    /// Produce the read-only status snapshot.
    pub fn snapshot(&self) -> StatusSnapshot {
        let now = (self.clock)();
        let persona = self.calendar.persona_on_air_at(now);
        StatusSnapshot {
            state: self.player.state(),
            persona,
            persona_name: self.personas[&persona].display_name.clone(),
            current: self.player.current().map(|item| (item.kind, item.label)),
            next: self.queue.peek_front().map(|item| item.label.clone()),
            uptime: self.started_at.elapsed(),
            songs_played: self.songs_played,
            error_count: self.error_count,
            message: self.message.clone(),
        }
    }

    /// Print the one-line status to the terminal. `\r\n` because the
    /// keyboard reader holds the terminal in raw mode.
    fn render_status(&self) {
        print!("{}\r\n", self.snapshot().render_line());
        use std::io::Write;
        let _ = std::io::stdout().flush();
    }

    // ========================================================================
    // Event handling
    // ========================================================================

    fn handle_player_event(&mut self, event: PlayerEvent, now: NaiveDateTime) {
        match event {
            PlayerEvent::Started(item) => {
                tracing::info!(label = %item.label, kind = ?item.kind, "now playing");
                self.awaiting_start = false;
                match item.kind {
                    QueueItemKind::Song => {
                        self.current_song = item.song_id;
                        self.current_intro_key = None;
                        self.message = None;
                    }
                    QueueItemKind::Intro => {
                        self.current_intro_key = item.content_key;
                    }
                    _ => {}
                }
                self.render_status();
            }
            PlayerEvent::Completed(item) => self.handle_completion(item, now),
            PlayerEvent::Error { item, message } => {
                tracing::warn!(label = %item.label, %message, "playback error; skipping");
                self.error_count += 1;
                self.awaiting_start = false;
                self.current_song = None;
                self.current_intro_key = None;
            }
        }
    }

    fn handle_completion(&mut self, item: QueueItem, now: NaiveDateTime) {
        tracing::debug!(label = %item.label, kind = ?item.kind, "completed");
        match item.kind {
            QueueItemKind::Song => {
                if let Some(id) = &item.song_id {
                    // Exactly once per completed play; the completion event
                    // itself fires at most once.
                    match self.rotation.record_play(id, None) {
                        Ok(tier) => {
                            tracing::debug!(song = %id, ?tier, "rotation updated");
                        }
                        Err(e) => tracing::warn!(song = %id, error = %e, "rotation update failed"),
                    }
                    self.songs_played += 1;
                    self.save_rotation();
                    self.enqueue_outro(id.clone(), now);
                }
                self.current_song = None;
            }
            QueueItemKind::Intro => {
                self.current_intro_key = None;
            }
            _ => {}
        }
        #[cfg(test)]
        self.completed_log.push(item);
    }

    /// Queue the song's outro, if one is rendered and passing.
    fn enqueue_outro(&mut self, song_id: SongId, now: NaiveDateTime) {
        let persona = self.calendar.persona_on_air_at(now);
        let key = ContentKey::new(ContentType::SongOutro, persona, song_id.as_str());
        if let Ok(item) = self.store.read_item(&key) {
            if item.playable() {
                let path = item.audio_file.expect("playable implies audio");
                let label = format!("outro ({})", song_id);
                self.queue.push_front(QueueItem::content(
                    QueueItemKind::Outro,
                    key,
                    path,
                    label,
                ));
            }
        }
    }

    // ========================================================================
    // Commands
    // ========================================================================

    fn apply_command(&mut self, command: StationCommand) {
        tracing::info!(?command, "operator command");
        match command {
            StationCommand::Quit => {
                self.shutdown_requested = true;
            }
            StationCommand::PauseToggle => match self.player.state() {
                PlaybackState::Playing => {
                    let _ = self.player.pause();
                }
                PlaybackState::Paused => {
                    let _ = self.player.resume();
                }
                _ => {}
            },
            StationCommand::Skip => {
                let _ = self.player.stop();
                self.current_song = None;
                self.current_intro_key = None;
            }
            StationCommand::BanishCurrent => {
                // During an intro-only moment there is no current song and
                // this is a safe no-op.
                let Some(id) = self.current_song.clone() else { return };
                if self.refuse_if_blocked() {
                    return;
                }
                match self.rotation.banish(&id) {
                    Ok(()) => {
                        tracing::info!(song = %id, "banished");
                        self.save_rotation();
                        let _ = self.player.stop();
                        self.current_song = None;
                    }
                    Err(e) => tracing::warn!(song = %id, error = %e, "banish failed"),
                }
            }
            StationCommand::FlagCurrentIntro => {
                let Some(key) = self.current_intro_key.clone() else { return };
                match self.store.mark_flagged(&key) {
                    Ok(()) => tracing::info!(%key, "intro flagged for regeneration"),
                    Err(e) => tracing::warn!(%key, error = %e, "flag failed"),
                }
                // Deliberately no skip: the intro plays out
            }
            StationCommand::PromoteCurrent => {
                let Some(id) = self.current_song.clone() else { return };
                if self.refuse_if_blocked() {
                    return;
                }
                match self.rotation.promote(&id) {
                    Ok(()) => {
                        tracing::info!(song = %id, "promoted to core");
                        self.save_rotation();
                    }
                    Err(e) => tracing::warn!(song = %id, error = %e, "promote failed"),
                }
            }
        }
    }

    fn refuse_if_blocked(&self) -> bool {
        if self.persist_blocked {
            tracing::warn!("state saving is failing; mutation refused until a save succeeds");
        }
        self.persist_blocked
    }

    // ========================================================================
    // Calendar windows
    // ========================================================================

    fn check_windows(&mut self, now: NaiveDateTime) {
        let persona = self.calendar.persona_on_air_at(now);

        if self.calendar.is_announcement_moment(now) {
            let slot = Calendar::announcement_slot_id(now);
            if self.last_announcement_slot.as_deref() != Some(slot.as_str()) {
                // Attempted once per slot whether or not content exists
                self.last_announcement_slot = Some(slot.clone());
                let key = ContentKey::new(ContentType::TimeAnnouncement, persona, slot.clone());
                self.push_front_content(key, QueueItemKind::Announcement, format!("time check {}", slot));
            }
        }

        if !self.options.no_weather {
            if let Some(window) = self.calendar.weather_window_at(now) {
                if self.weather_played.get(&window) != Some(&now.date()) {
                    self.weather_played.insert(window, now.date());
                    let key = ContentKey::new(
                        ContentType::WeatherAnnouncement,
                        persona,
                        window.as_str(),
                    );
                    self.push_front_content(
                        key,
                        QueueItemKind::Announcement,
                        format!("{} weather", window),
                    );
                }
            }
        }
    }

    /// Front-insert a rendered content item; absent or unready content is
    /// silently skipped (the window simply goes without an announcement).
    fn push_front_content(&mut self, key: ContentKey, kind: QueueItemKind, label: String) {
        match self.store.read_item(&key) {
            Ok(item) if item.playable() => {
                let path = item.audio_file.expect("playable implies audio");
                tracing::info!(%key, "queueing announcement");
                self.queue.push_front(QueueItem::content(kind, key, path, label));
            }
            Ok(_) => tracing::debug!(%key, "no rendered content for window"),
            Err(e) => tracing::warn!(%key, error = %e, "content lookup failed"),
        }
    }

    // ========================================================================
    // What plays next
    // ========================================================================

    fn advance(&mut self, now: NaiveDateTime) {
        if let Some(item) = self.queue.pop_front() {
            self.play(item);
            return;
        }
        if self.decide_next(now) {
            if let Some(item) = self.queue.pop_front() {
                self.play(item);
            }
        } else if self.message.is_none() {
            self.message = Some("nothing playable; station idle".to_string());
            tracing::warn!("no playable songs; station idles");
        }
    }

    fn play(&mut self, item: QueueItem) {
        self.awaiting_start = true;
        if self.player.play(item).is_err() {
            self.awaiting_start = false;
            self.error_count += 1;
        }
    }

    /// Fill the queue with the next program: a show bundle when a window is
    /// open, otherwise a song with its intro when one is rendered.
    fn decide_next(&mut self, now: NaiveDateTime) -> bool {
        let persona = self.calendar.persona_on_air_at(now);

        if !self.options.no_shows && self.show_played_on != Some(now.date()) {
            if let Some(show_id) = self.calendar.show_window_at(now) {
                let show = self
                    .shows
                    .iter()
                    .find(|s| s.id == show_id)
                    .cloned();
                if let Some(show) = show {
                    // One attempt per day, even when the recording is missing
                    self.show_played_on = Some(now.date());
                    match &show.audio_file {
                        Some(path) if path.exists() => {
                            self.queue_show(&show, persona);
                            return true;
                        }
                        _ => {
                            tracing::warn!(show = %show.id, "show window open but no recording");
                        }
                    }
                }
            }
        }

        let Some(song) = self.rotation.next_song(&self.catalog, &mut self.rng) else {
            return false;
        };
        let song_item = QueueItem::song(song);
        let intro_key = ContentKey::new(ContentType::SongIntro, persona, song.id.as_str());
        let intro = match self.store.read_item(&intro_key) {
            Ok(item) if item.playable() => {
                let path = item.audio_file.expect("playable implies audio");
                let label = format!("intro ({})", song.display_label());
                Some(QueueItem::content(QueueItemKind::Intro, intro_key, path, label))
            }
            _ => None,
        };

        match intro {
            Some(intro) => self.queue.push_front_pair(intro, song_item),
            None => self.queue.push_front(song_item),
        }
        true
    }

    fn queue_show(&mut self, show: &ShowConfig, persona: PersonaId) {
        let path = show.audio_file.clone().expect("checked by caller");
        let intro_key = ContentKey::new(ContentType::ShowIntro, persona, show.id.as_str());
        let outro_key = ContentKey::new(ContentType::ShowOutro, persona, show.id.as_str());

        if let Ok(item) = self.store.read_item(&intro_key) {
            if item.playable() {
                let audio = item.audio_file.expect("playable implies audio");
                self.queue.push_back(QueueItem::content(
                    QueueItemKind::Announcement,
                    intro_key,
                    audio,
                    format!("show intro ({})", show.title),
                ));
            }
        }
        self.queue.push_back(QueueItem::show_segment(path, show.title.clone()));
        if let Ok(item) = self.store.read_item(&outro_key) {
            if item.playable() {
                let audio = item.audio_file.expect("playable implies audio");
                self.queue.push_back(QueueItem::content(
                    QueueItemKind::Announcement,
                    outro_key,
                    audio,
                    format!("show outro ({})", show.title),
                ));
            }
        }
        tracing::info!(show = %show.id, "show queued");
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    fn save_rotation(&mut self) {
        match self.rotation.save(&self.rotation_path) {
            Ok(()) => self.persist_blocked = false,
            Err(e) => {
                // Never kill playback over a save miss; refuse further
                // mutations until a save succeeds.
                tracing::warn!(error = %e, "rotation save failed");
                self.persist_blocked = true;
            }
        }
    }

    fn persist(&mut self) {
        if let Err(e) = self.catalog.save(&self.catalog_path) {
            tracing::warn!(error = %e, "catalog save failed");
        }
        self.save_rotation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Song, Tier};
    use crate::player::TimerSink;
    use crate::test_utils::{
        playable_song, test_calendar, test_personas, test_schedule, write_ready_item,
    };
    use chrono::NaiveDate;
    use parking_lot::Mutex;
    use tempfile::{TempDir, tempdir};

    /// Station wired to a fake clock and a fast timer sink. One real second
    /// of song is two milliseconds of test time.
    struct Harness {
        dir: TempDir,
        clock: Arc<Mutex<NaiveDateTime>>,
        station: Station,
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    impl Harness {
        fn new(catalog: Catalog, start: NaiveDateTime) -> Self {
            Self::with_options(catalog, start, StationOptions::default())
        }

        fn with_options(
            catalog: Catalog,
            start: NaiveDateTime,
            options: StationOptions,
        ) -> Self {
            let dir = tempdir().unwrap();
            let clock = Arc::new(Mutex::new(start));
            let clock_handle = clock.clone();

            let station = Station::new(StationParams {
                catalog,
                rotation: RotationEngine::new(0.7, 5),
                store: ContentStore::new(dir.path()),
                calendar: test_calendar(),
                personas: test_personas(),
                shows: Vec::new(),
                player: Player::spawn(Box::new(TimerSink::scaled(0.002))),
                commands: CommandBuffer::new(16),
                clock: Box::new(move || *clock_handle.lock()),
                options,
                catalog_path: dir.path().join("catalog.json"),
                rotation_path: dir.path().join("rotation.json"),
                rng_seed: Some(42),
            });
            Self { dir, clock, station }
        }

        fn store(&self) -> ContentStore {
            ContentStore::new(self.dir.path())
        }

        fn set_time(&self, t: NaiveDateTime) {
            *self.clock.lock() = t;
        }

        fn run_until(&mut self, what: &str, pred: impl Fn(&Station) -> bool) {
            for _ in 0..2000 {
                self.station.tick();
                if pred(&self.station) {
                    return;
                }
                std::thread::sleep(Duration::from_millis(2));
            }
            panic!("timed out waiting for: {}", what);
        }
    }

    fn two_song_catalog(dir: &TempDir) -> (Catalog, SongId, SongId) {
        let mut catalog = Catalog::new();
        let a = playable_song(dir.path(), "Alpha", "First", 5);
        let b = playable_song(dir.path(), "Beta", "Second", 5);
        let (ida, idb) = (a.id.clone(), b.id.clone());
        catalog.add_song(a);
        catalog.add_song(b);
        (catalog, ida, idb)
    }

    #[test]
    fn test_announcement_plays_between_songs() {
        let files = tempdir().unwrap();
        let (catalog, ida, idb) = two_song_catalog(&files);
        let song_a = catalog.get_song(&ida).unwrap().clone();
        let song_b = catalog.get_song(&idb).unwrap().clone();

        let mut h = Harness::new(catalog, at(10, 29, 58));
        write_ready_item(
            &h.store(),
            &ContentKey::new(ContentType::TimeAnnouncement, PersonaId::A, "10-30"),
            "It's half past ten.",
        );
        // Fix the playout order: A then B
        h.station.queue.push_back(QueueItem::song(&song_a));
        h.station.queue.push_back(QueueItem::song(&song_b));

        // First tick starts song A; no announcement moment yet
        h.station.tick();
        // The half-hour boundary arrives while A is still playing
        h.set_time(at(10, 30, 0));

        h.run_until("three completions", |s| s.completed_log.len() >= 3);

        let kinds: Vec<QueueItemKind> =
            h.station.completed_log.iter().take(3).map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![QueueItemKind::Song, QueueItemKind::Announcement, QueueItemKind::Song],
            "announcement waits for the current song, then precedes the next"
        );
        assert_eq!(h.station.completed_log[0].song_id, Some(ida.clone()));
        assert_eq!(h.station.completed_log[2].song_id, Some(idb.clone()));

        // Rotation counted the two songs, not the announcement
        assert_eq!(h.station.songs_played, 2);
        assert_eq!(h.station.rotation.record(&ida).unwrap().play_count, 1);
        assert_eq!(h.station.rotation.record(&idb).unwrap().play_count, 1);
    }

    #[test]
    fn test_banish_mid_play_stops_and_excludes() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        for (artist, title) in [("X", "One"), ("Y", "Two"), ("Z", "Three")] {
            catalog.add_song(playable_song(files.path(), artist, title, 60));
        }
        let mut h = Harness::new(catalog, at(9, 15, 0));

        h.run_until("a song starts", |s| s.current_song.is_some());
        let banned = h.station.current_song.clone().unwrap();

        h.station.commands.push(StationCommand::BanishCurrent);
        h.run_until("advance past the banished song", |s| {
            s.current_song.as_ref().is_some_and(|id| *id != banned)
        });

        assert_eq!(h.station.rotation.tier_of(&banned).unwrap(), Tier::Banished);
        // The banished song was cut, so it never completed
        assert!(h.station.completed_log.iter().all(|i| i.song_id.as_ref() != Some(&banned)));

        // And it never comes back
        h.run_until("several more plays", |s| s.songs_played >= 4);
        assert!(h.station.completed_log.iter().all(|i| i.song_id.as_ref() != Some(&banned)));
    }

    #[test]
    fn test_auto_graduation_on_fifth_completion() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let only = playable_song(files.path(), "Solo", "Repeat", 2);
        let id = only.id.clone();
        catalog.add_song(only);
        let mut h = Harness::new(catalog, at(9, 15, 0));

        h.run_until("four plays", |s| s.songs_played == 4);
        assert_eq!(h.station.rotation.tier_of(&id).unwrap(), Tier::Discovery);

        h.run_until("fifth play", |s| s.songs_played >= 5);
        assert_eq!(h.station.rotation.tier_of(&id).unwrap(), Tier::Core);
        assert!(h.station.rotation.record(&id).unwrap().play_count >= 5);
    }

    #[test]
    fn test_intro_plays_before_its_song() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let only = playable_song(files.path(), "Solo", "Opener", 5);
        let id = only.id.clone();
        catalog.add_song(only);

        let mut h = Harness::new(catalog, at(9, 15, 0));
        write_ready_item(
            &h.store(),
            &ContentKey::new(ContentType::SongIntro, PersonaId::A, id.as_str()),
            "Here comes a favorite.",
        );

        h.run_until("intro and song complete", |s| s.completed_log.len() >= 2);
        assert_eq!(h.station.completed_log[0].kind, QueueItemKind::Intro);
        assert_eq!(h.station.completed_log[1].kind, QueueItemKind::Song);
        // The intro completion did not touch rotation
        assert_eq!(h.station.rotation.record(&id).unwrap().play_count, 1);
    }

    #[test]
    fn test_outro_plays_after_song_completion() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let only = playable_song(files.path(), "Solo", "Closer", 5);
        let id = only.id.clone();
        catalog.add_song(only);

        let mut h = Harness::new(catalog, at(9, 15, 0));
        write_ready_item(
            &h.store(),
            &ContentKey::new(ContentType::SongOutro, PersonaId::A, id.as_str()),
            "That one never gets old.",
        );

        h.run_until("song then outro complete", |s| s.completed_log.len() >= 2);
        assert_eq!(h.station.completed_log[0].kind, QueueItemKind::Song);
        assert_eq!(h.station.completed_log[1].kind, QueueItemKind::Outro);
    }

    #[test]
    fn test_flag_during_intro_marks_without_skipping() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let only = playable_song(files.path(), "Solo", "Flagged", 60);
        let id = only.id.clone();
        catalog.add_song(only);

        let mut h = Harness::new(catalog, at(9, 15, 0));
        let intro_key = ContentKey::new(ContentType::SongIntro, PersonaId::A, id.as_str());
        write_ready_item(&h.store(), &intro_key, "An intro worth flagging.");

        h.run_until("intro starts", |s| s.current_intro_key.is_some());
        // Banish during an intro-only moment is a safe no-op
        h.station.commands.push(StationCommand::BanishCurrent);
        h.station.commands.push(StationCommand::FlagCurrentIntro);
        h.run_until("intro completes", |s| {
            s.completed_log.iter().any(|i| i.kind == QueueItemKind::Intro)
        });

        use crate::content::ContentStatus;
        assert_eq!(h.store().read_item(&intro_key).unwrap().status, ContentStatus::Flagged);
        assert_eq!(h.station.rotation.tier_of(&id).unwrap(), Tier::Discovery);
    }

    #[test]
    fn test_all_banished_idles_with_message() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        let only = playable_song(files.path(), "Solo", "Gone", 5);
        let id = only.id.clone();
        catalog.add_song(only);

        let mut h = Harness::new(catalog, at(9, 15, 0));
        h.station.rotation.banish(&id).unwrap();

        h.station.tick();
        assert!(h.station.message.as_deref().unwrap_or("").contains("idle"));
        assert_eq!(h.station.snapshot().state, PlaybackState::Stopped);
        // Station is still alive and ticking
        assert!(h.station.tick());
    }

    #[test]
    fn test_missing_file_counts_error_and_continues() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        // One playable song and one whose file does not exist
        let good = playable_song(files.path(), "Good", "Here", 2);
        catalog.add_song(good);
        catalog.add_song(Song::new("Bad", "Missing", 120, "/no/such/file.mp3"));

        let mut h = Harness::new(catalog, at(9, 15, 0));
        h.run_until("an error and a successful play", |s| {
            s.error_count >= 1 && s.songs_played >= 1
        });
        assert!(h.station.tick(), "station keeps running after playback errors");
    }

    #[test]
    fn test_pause_toggle() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        catalog.add_song(playable_song(files.path(), "Long", "Player", 120));
        let mut h = Harness::new(catalog, at(9, 15, 0));

        h.run_until("song starts", |s| s.current_song.is_some());
        h.station.commands.push(StationCommand::PauseToggle);
        h.run_until("paused", |s| s.player.state() == PlaybackState::Paused);

        h.station.commands.push(StationCommand::PauseToggle);
        h.run_until("resumed", |s| s.player.state() == PlaybackState::Playing);
    }

    #[test]
    fn test_quit_ends_the_loop() {
        let files = tempdir().unwrap();
        let mut catalog = Catalog::new();
        catalog.add_song(playable_song(files.path(), "Any", "Song", 60));
        let mut h = Harness::new(catalog, at(9, 15, 0));

        h.station.tick();
        h.station.commands.push(StationCommand::Quit);
        // The tick that drains Quit reports the loop should stop
        let mut alive = true;
        for _ in 0..10 {
            alive = h.station.tick();
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }

    #[test]
    fn test_weather_window_queued_once_per_day() {
        let files = tempdir().unwrap();
        let (catalog, _, _) = two_song_catalog(&files);
        let mut h = Harness::new(catalog, at(11, 59, 59));
        write_ready_item(
            &h.store(),
            &ContentKey::new(ContentType::WeatherAnnouncement, PersonaId::A, "midday"),
            "Sunny, probably.",
        );

        h.station.tick();
        h.set_time(at(12, 0, 0));
        h.run_until("weather announcement completes", |s| {
            s.completed_log.iter().any(|i| i.kind == QueueItemKind::Announcement)
        });

        // Still inside the window minute: not queued a second time
        h.set_time(at(12, 0, 1));
        for _ in 0..5 {
            h.station.tick();
        }
        let weather_plays = h
            .station
            .completed_log
            .iter()
            .filter(|i| i.kind == QueueItemKind::Announcement)
            .count();
        assert_eq!(weather_plays, 1);
    }

    #[test]
    fn test_no_weather_flag_suppresses_window() {
        let files = tempdir().unwrap();
        let (catalog, _, _) = two_song_catalog(&files);
        let options = StationOptions { no_weather: true, ..StationOptions::default() };
        let mut h = Harness::with_options(catalog, at(12, 0, 0), options);
        write_ready_item(
            &h.store(),
            &ContentKey::new(ContentType::WeatherAnnouncement, PersonaId::A, "midday"),
            "Sunny, probably.",
        );

        h.run_until("a couple of songs", |s| s.songs_played >= 2);
        assert!(
            h.station
                .completed_log
                .iter()
                .all(|i| i.kind != QueueItemKind::Announcement)
        );
    }

    #[test]
    fn test_show_bundle_queued_once_per_day() {
        let files = tempdir().unwrap();
        let (catalog, _, _) = two_song_catalog(&files);
        let show_audio = files.path().join("show.wav");
        std::fs::write(&show_audio, b"fake show recording").unwrap();

        let dir = tempdir().unwrap();
        let clock = Arc::new(Mutex::new(at(21, 5, 0)));
        let clock_handle = clock.clone();
        let calendar = Calendar::new(
            test_schedule(),
            2,
            [
                (WeatherWindow::Morning, 7),
                (WeatherWindow::Midday, 12),
                (WeatherWindow::Evening, 18),
            ],
            vec![("night-flight".to_string(), 21)],
        );
        let store = ContentStore::new(dir.path());
        let intro_key = ContentKey::new(ContentType::ShowIntro, PersonaId::B, "night-flight");
        let outro_key = ContentKey::new(ContentType::ShowOutro, PersonaId::B, "night-flight");
        write_ready_item(&store, &intro_key, "Welcome to Night Flight.");
        write_ready_item(&store, &outro_key, "That's all for tonight.");

        let station = Station::new(StationParams {
            catalog,
            rotation: RotationEngine::new(0.7, 5),
            store,
            calendar,
            personas: test_personas(),
            shows: vec![ShowConfig {
                id: "night-flight".to_string(),
                title: "Night Flight".to_string(),
                hour: 21,
                audio_file: Some(show_audio),
            }],
            player: Player::spawn(Box::new(TimerSink::scaled(0.002))),
            commands: CommandBuffer::new(16),
            clock: Box::new(move || *clock_handle.lock()),
            options: StationOptions::default(),
            catalog_path: dir.path().join("catalog.json"),
            rotation_path: dir.path().join("rotation.json"),
            rng_seed: Some(42),
        });
        let mut h = Harness { dir, clock, station };

        h.run_until("show bundle completes", |s| {
            s.completed_log.iter().any(|i| i.kind == QueueItemKind::ShowSegment)
        });

        let kinds: Vec<QueueItemKind> =
            h.station.completed_log.iter().take(3).map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![
                QueueItemKind::Announcement,
                QueueItemKind::ShowSegment,
                QueueItemKind::Announcement
            ],
            "show intro, segment, outro in order"
        );

        // Still in the show hour: regular programming resumes, no second show
        h.run_until("a song after the show", |s| s.songs_played >= 1);
        let segments = h
            .station
            .completed_log
            .iter()
            .filter(|i| i.kind == QueueItemKind::ShowSegment)
            .count();
        assert_eq!(segments, 1);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let files = tempdir().unwrap();
        let (catalog, _, _) = two_song_catalog(&files);
        let mut h = Harness::new(catalog, at(9, 15, 0));

        let idle = h.station.snapshot();
        assert_eq!(idle.state, PlaybackState::Stopped);
        assert_eq!(idle.persona, PersonaId::A);
        assert_eq!(idle.persona_name, "Marla");
        assert_eq!(idle.songs_played, 0);

        h.run_until("playing", |s| s.player.state() == PlaybackState::Playing);
        let playing = h.station.snapshot();
        assert!(playing.current.is_some());

        // Evening belongs to persona B
        h.set_time(at(19, 0, 0));
        assert_eq!(h.station.snapshot().persona, PersonaId::B);
    }

    #[test]
    fn test_rotation_persisted_after_plays() {
        let files = tempdir().unwrap();
        let (catalog, ida, idb) = two_song_catalog(&files);
        let mut h = Harness::new(catalog, at(9, 15, 0));

        h.run_until("two plays", |s| s.songs_played >= 2);
        let loaded =
            RotationEngine::load(&h.dir.path().join("rotation.json"), 0.7, 5).unwrap();
        let total = loaded.record(&ida).map(|r| r.play_count).unwrap_or(0)
            + loaded.record(&idb).map(|r| r.play_count).unwrap_or(0);
        assert!(total >= 2, "play counts reached disk");
    }
}
