//! Announcement loop.
//!
//! POLL → ANNOUNCE → POLL
//!
//! One task owns everything: it asks the tracker for changes, turns each into
//! a sentence, and plays the sentences one after another, waiting out each
//! clip before the next starts.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, Timelike};
use tracing::{info, warn};

use crate::chimes::Chimes;
use crate::config::AnnouncerConfig;
use crate::history::{AnnouncementRecord, EventKind, History, Outcome};
use crate::phrases::Phrasebook;
use crate::playback::PlaySamples;
use crate::presence::{PresenceChanges, PresenceTracker};
use crate::scans::ScanQuery;
use crate::speaker::{VoiceMode, VoiceService};

pub struct Announcer<S, P> {
    tracker: PresenceTracker<S>,
    voice: VoiceService,
    player: P,
    phrasebook: Phrasebook,
    chimes: Chimes,
    history: Option<History>,
    poll_interval: Duration,
    settle_interval: Duration,
}

impl<S: ScanQuery, P: PlaySamples> Announcer<S, P> {
    pub fn new(
        tracker: PresenceTracker<S>,
        voice: VoiceService,
        player: P,
        phrasebook: Phrasebook,
        config: &AnnouncerConfig,
    ) -> Self {
        Self {
            tracker,
            voice,
            player,
            phrasebook,
            chimes: Chimes::new(&Default::default()),
            history: None,
            poll_interval: config.poll_interval(),
            settle_interval: config.settle_interval(),
        }
    }

    pub fn with_chimes(mut self, chimes: Chimes) -> Self {
        self.chimes = chimes;
        self
    }

    pub fn with_history(mut self, history: History) -> Self {
        self.history = Some(history);
        self
    }

    /// Swallow whatever the source already shows, see `PresenceTracker::prime`.
    pub fn prime(&mut self) -> crate::error::Result<()> {
        self.tracker.prime()
    }

    /// Poll until Ctrl-C.
    pub async fn run(&mut self) -> crate::error::Result<()> {
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            "Announcer ready, polling every {}ms",
            self.poll_interval.as_millis()
        );

        loop {
            tokio::select! {
                res = &mut shutdown => {
                    res?;
                    info!("Interrupted, shutting down");
                    return Ok(());
                }
                _ = self.tick() => {}
            }
        }
    }

    async fn tick(&mut self) {
        if self.run_cycle().await == 0 {
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// One poll. Returns how many announcements were attempted.
    pub async fn run_cycle(&mut self) -> usize {
        self.run_cycle_at(Local::now().naive_local()).await
    }

    async fn run_cycle_at(&mut self, now: NaiveDateTime) -> usize {
        let changes = match self.tracker.check_at(now) {
            Ok(changes) => changes,
            Err(e) => {
                warn!("Presence check failed: {e}");
                PresenceChanges::default()
            }
        };
        let chimes = self.chimes.due(now);

        let events = changes.len() + chimes.len();
        if events == 0 {
            return 0;
        }
        info!("{events} events");

        let mut outcomes = Vec::with_capacity(events);
        for person in &changes.entered {
            let phrases = self.phrasebook.arrival(person, now.hour());
            let mode = self.phrasebook.mode_for(person);
            let outcome = self
                .announce(now, EventKind::Arrival, Some(person.as_str()), &phrases, mode)
                .await;
            outcomes.push(outcome);
        }
        for person in &changes.exited {
            let phrases = self.phrasebook.departure(person);
            let mode = self.phrasebook.mode_for(person);
            let outcome = self
                .announce(now, EventKind::Departure, Some(person.as_str()), &phrases, mode)
                .await;
            outcomes.push(outcome);
        }
        for phrases in &chimes {
            let outcome = self
                .announce(now, EventKind::Chime, None, phrases, VoiceMode::Standard)
                .await;
            outcomes.push(outcome);
        }

        let failed = failed_count(&outcomes);
        if failed > 0 {
            warn!("{failed} of {events} announcements failed");
        }
        events
    }

    /// Speak one sentence and wait until it has been heard. Failures skip the
    /// sentence; the settle pause applies either way.
    async fn announce(
        &mut self,
        at: NaiveDateTime,
        event: EventKind,
        person: Option<&str>,
        phrases: &[String],
        mode: VoiceMode,
    ) -> Outcome {
        info!("Announcing {event}: {}", phrases.join(" "));

        let t0 = Instant::now();
        let spoken = self.voice.speak(phrases, mode).await;
        let latency = t0.elapsed();

        let (outcome, duration, error) = match spoken {
            Err(e) => {
                warn!("Skipping {event} announcement: {e}");
                (Outcome::SynthesisFailed, Duration::ZERO, Some(e.to_string()))
            }
            Ok(clip) => match self.player.play(&clip.samples, clip.sample_rate) {
                Ok(()) => (Outcome::Spoken, clip.duration(), None),
                Err(e) => {
                    warn!("Playback failed for {event} announcement: {e}");
                    (Outcome::PlaybackFailed, Duration::ZERO, Some(e.to_string()))
                }
            },
        };

        tokio::time::sleep(duration + self.settle_interval).await;

        if let Some(history) = &self.history {
            history.save_record(&AnnouncementRecord {
                timestamp: AnnouncementRecord::format_timestamp(at),
                event,
                person: person.map(str::to_string),
                phrases: phrases.to_vec(),
                backend: self.voice.backend(mode).backend_key(),
                synthesis_latency_ms: latency.as_millis() as i64,
                audio_duration_s: duration.as_secs_f64(),
                outcome,
                error,
            });
        }
        outcome
    }
}

fn failed_count(outcomes: &[Outcome]) -> usize {
    outcomes.iter().filter(|&&o| o != Outcome::Spoken).count()
}
