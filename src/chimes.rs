//! Time signal: fixed sentences spoken at set times of day.
//!
//! An entry is due during its exact minute. It fires at most once per day,
//! however often the announcer checks within that minute.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use tracing::debug;

use crate::config::{ChimeEntry, ChimesConfig};

pub struct Chimes {
    entries: Vec<ChimeEntry>,
    last_fired: Vec<Option<NaiveDate>>,
}

impl Chimes {
    /// An empty schedule when chimes are disabled.
    pub fn new(config: &ChimesConfig) -> Self {
        let entries = if config.enabled {
            config.schedule.clone()
        } else {
            Vec::new()
        };
        let last_fired = vec![None; entries.len()];
        Self {
            entries,
            last_fired,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sentences due at `now`, each marked as fired for today.
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<Vec<String>> {
        let today = now.date();
        let weekday = today.weekday().number_from_monday() <= 5;

        let mut sentences = Vec::new();
        for (entry, fired) in self.entries.iter().zip(self.last_fired.iter_mut()) {
            if entry.weekdays_only && !weekday {
                continue;
            }
            if entry.hour != now.hour() || entry.minute != now.minute() {
                continue;
            }
            if *fired == Some(today) {
                continue;
            }
            debug!("Chime {:02}:{:02} due", entry.hour, entry.minute);
            *fired = Some(today);
            sentences.push(entry.phrases.clone());
        }
        sentences
    }

    /// Every phrase any entry can speak.
    pub fn phrases(&self) -> Vec<String> {
        self.entries.iter().flat_map(|e| e.phrases.iter().cloned()).collect()
    }
}
