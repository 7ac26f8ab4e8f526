//! Presence tracking: who arrived and who left today.
//!
//! Each poll rebuilds today's scan window per person from the source, derives
//! the first and last scan, and reports a person as entered/exited the first
//! time the corresponding timestamp shows up. Flags live until the calendar
//! day changes.

use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::error::Result;
use crate::scans::{PersonId, ScanQuery};

/// Departure scans closer than this to the arrival are treated as a bounce.
pub const DEFAULT_NOISE_WINDOW_SECS: i64 = 5 * 60;

/// First and last scan of a person on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnterExit {
    pub enter: Option<NaiveDateTime>,
    pub exit: Option<NaiveDateTime>,
}

impl EnterExit {
    /// Derive enter/exit from `scans`, ignoring any not on `day`.
    pub fn from_scans(scans: &[NaiveDateTime], day: NaiveDate, noise_window: Duration) -> Self {
        let same_day = || scans.iter().copied().filter(|ts| ts.date() == day);
        let enter = same_day().min();
        let mut exit = same_day().max();

        if let (Some(first), Some(last)) = (enter, exit) {
            if last - first < noise_window {
                exit = None;
            }
        }

        Self { enter, exit }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NotificationFlags {
    entered: bool,
    exited: bool,
}

/// Persons newly reported by one `check`, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChanges {
    pub entered: Vec<PersonId>,
    pub exited: Vec<PersonId>,
}

impl PresenceChanges {
    pub fn len(&self) -> usize {
        self.entered.len() + self.exited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct PresenceTracker<S> {
    source: S,
    noise_window: Duration,
    last_seen_day: NaiveDate,
    flags: HashMap<PersonId, NotificationFlags>,
}

impl<S: ScanQuery> PresenceTracker<S> {
    pub fn new(source: S, noise_window: Duration) -> Self {
        Self::starting_on(source, noise_window, Local::now().date_naive())
    }

    fn starting_on(source: S, noise_window: Duration, day: NaiveDate) -> Self {
        Self {
            source,
            noise_window,
            last_seen_day: day,
            flags: HashMap::new(),
        }
    }

    /// Run one check and drop the result, so people already in the
    /// building at startup are not announced again.
    pub fn prime(&mut self) -> Result<()> {
        let skipped = self.check()?;
        info!("Primed presence tracker ({} events suppressed)", skipped.len());
        Ok(())
    }

    pub fn check(&mut self) -> Result<PresenceChanges> {
        self.check_at(Local::now().naive_local())
    }

    /// Poll the source as of `now`.
    ///
    /// On a source error the flags are left as they were, apart from a
    /// day-rollover reset which is safe to repeat.
    pub fn check_at(&mut self, now: NaiveDateTime) -> Result<PresenceChanges> {
        let today = now.date();
        if today != self.last_seen_day {
            info!("Day changed {} → {today}, resetting presence flags", self.last_seen_day);
            self.last_seen_day = today;
            self.flags.clear();
        }

        let windows = self.fetch_today(today)?;

        let mut changes = PresenceChanges::default();
        for (person, scans) in windows {
            let EnterExit { enter, exit } = EnterExit::from_scans(&scans, today, self.noise_window);
            let flags = self.flags.entry(person.clone()).or_default();

            if enter.is_some() && !flags.entered {
                flags.entered = true;
                changes.entered.push(person.clone());
            }
            if exit.is_some() && !flags.exited {
                flags.exited = true;
                changes.exited.push(person);
            }
        }

        if !changes.is_empty() {
            debug!("Presence changes: entered={:?} exited={:?}", changes.entered, changes.exited);
        }
        Ok(changes)
    }

    fn fetch_today(&self, today: NaiveDate) -> Result<Vec<(PersonId, Vec<NaiveDateTime>)>> {
        let from = today.and_time(chrono::NaiveTime::MIN);
        let to = from + Duration::days(1);

        self.source
            .list_tracked_persons()?
            .into_iter()
            .map(|person| {
                let scans = self.source.list_scans(&person, from, to)?;
                Ok((person, scans))
            })
            .collect()
    }
}
