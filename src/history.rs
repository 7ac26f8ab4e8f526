//! Announcement history and daily reports.
//!
//! Every announcement is appended to a daily JSONL file in
//! ~/.arrival-announcer-history/ (configurable). `report` renders one day as
//! Markdown.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Arrival,
    Departure,
    Chime,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Arrival => write!(f, "arrival"),
            Self::Departure => write!(f, "departure"),
            Self::Chime => write!(f, "chime"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Spoken,
    SynthesisFailed,
    PlaybackFailed,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Spoken => "spoken",
            Self::SynthesisFailed => "synthesis failed",
            Self::PlaybackFailed => "playback failed",
        }
    }
}

/// One announced (or attempted) sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnouncementRecord {
    pub timestamp: String,
    pub event: EventKind,
    pub person: Option<String>,
    pub phrases: Vec<String>,
    pub backend: String,
    pub synthesis_latency_ms: i64,
    pub audio_duration_s: f64,
    pub outcome: Outcome,
    pub error: Option<String>,
}

impl AnnouncementRecord {
    pub fn format_timestamp(at: NaiveDateTime) -> String {
        at.format(TIMESTAMP_FORMAT).to_string()
    }
}

pub struct History {
    dir: PathBuf,
}

impl History {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File for a `YYYY-MM-DD` date, or "today".
    fn file(&self, date: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", resolve_date(date)))
    }

    /// Append a record to the file of the day it happened on. Failures are
    /// logged and otherwise ignored.
    pub fn save_record(&self, record: &AnnouncementRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create history dir: {e}");
            return;
        }

        let date = record.timestamp.get(..10).unwrap_or("today");
        let path = self.file(date);
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write history record: {e}");
                    } else {
                        debug!("Saved announcement record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize record: {e}"),
            },
            Err(e) => error!("Failed to open history file: {e}"),
        }
    }

    pub fn load_records(&self, date: &str) -> Vec<AnnouncementRecord> {
        let path = self.file(date);
        if !path.exists() {
            return Vec::new();
        }

        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to load history records: {e}");
                return Vec::new();
            }
        };

        std::io::BufReader::new(file)
            .lines()
            .map_while(|line| line.ok())
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line.trim()) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping malformed history line: {e}");
                    None
                }
            })
            .collect()
    }

    /// Dates with records, newest first.
    pub fn list_available_dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();

        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    /// Markdown summary of one day.
    pub fn generate_report(&self, date: &str) -> String {
        let records = self.load_records(date);
        let display_date = resolve_date(date);

        if records.is_empty() {
            return format!("# Arrival Announcer Report - {display_date}\n\nNo announcements recorded.");
        }

        let count = |kind: EventKind| records.iter().filter(|r| r.event == kind).count();
        let failures = records.iter().filter(|r| r.outcome != Outcome::Spoken).count();
        let total_audio: f64 = records.iter().map(|r| r.audio_duration_s).sum();
        let avg_latency = records.iter().map(|r| r.synthesis_latency_ms).sum::<i64>() as f64
            / records.len() as f64;

        let first_arrival = records
            .iter()
            .filter(|r| r.event == EventKind::Arrival)
            .map(|r| r.timestamp.as_str())
            .min();
        let last_departure = records
            .iter()
            .filter(|r| r.event == EventKind::Departure)
            .map(|r| r.timestamp.as_str())
            .max();

        let mut lines = vec![
            format!("# Arrival Announcer Report - {display_date}"),
            String::new(),
            "## Summary".to_string(),
            format!("- **Announcements**: {}", records.len()),
            format!("- **Arrivals**: {}", count(EventKind::Arrival)),
            format!("- **Departures**: {}", count(EventKind::Departure)),
            format!("- **Chimes**: {}", count(EventKind::Chime)),
            format!("- **Failed**: {failures}"),
            format!("- **Total audio**: {}", format_duration(total_audio)),
            format!("- **Average synthesis latency**: {avg_latency:.0}ms"),
        ];
        if let Some(ts) = first_arrival {
            lines.push(format!("- **First arrival**: {}", time_of(ts)));
        }
        if let Some(ts) = last_departure {
            lines.push(format!("- **Last departure**: {}", time_of(ts)));
        }

        lines.extend([
            String::new(),
            "## Announcement Log".to_string(),
            String::new(),
            "| Time | Event | Person | Sentence | Outcome |".to_string(),
            "|------|-------|--------|----------|---------|".to_string(),
        ]);

        for r in &records {
            lines.push(format!(
                "| {} | {} | {} | {} | {} |",
                time_of(&r.timestamp),
                r.event,
                r.person.as_deref().unwrap_or("-"),
                truncate(&r.phrases.join(" "), 40),
                r.outcome.label()
            ));
        }

        lines.join("\n")
    }
}

fn resolve_date(date: &str) -> String {
    if date == "today" {
        Local::now().format("%Y-%m-%d").to_string()
    } else {
        date.to_string()
    }
}

/// HH:MM:SS out of a record timestamp.
fn time_of(timestamp: &str) -> &str {
    timestamp.get(11..19).unwrap_or(timestamp)
}

fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{seconds:.1}s")
    } else {
        let minutes = (seconds / 60.0) as u64;
        let secs = seconds % 60.0;
        if minutes < 60 {
            format!("{minutes}m {secs:.0}s")
        } else {
            format!("{}h {}m", minutes / 60, minutes % 60)
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: &str, event: EventKind, person: Option<&str>, outcome: Outcome) -> AnnouncementRecord {
        AnnouncementRecord {
            timestamp: timestamp.to_string(),
            event,
            person: person.map(str::to_string),
            phrases: vec!["ハラさん".into(), "おはようございます".into()],
            backend: "query-speaker2-24000".into(),
            synthesis_latency_ms: 120,
            audio_duration_s: 1.5,
            outcome,
            error: None,
        }
    }

    #[test]
    fn records_land_in_their_day_file() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());

        history.save_record(&record("2026-10-15T18:00:00", EventKind::Departure, Some("Hara"), Outcome::Spoken));
        history.save_record(&record("2026-10-16T09:00:04", EventKind::Arrival, Some("Hara"), Outcome::Spoken));
        history.save_record(&record("2026-10-16T12:00:00", EventKind::Chime, None, Outcome::PlaybackFailed));

        assert_eq!(history.load_records("2026-10-15").len(), 1);
        let day = history.load_records("2026-10-16");
        assert_eq!(day.len(), 2);
        assert_eq!(day[1].event, EventKind::Chime);
        assert_eq!(history.list_available_dates(), vec!["2026-10-16", "2026-10-15"]);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        history.save_record(&record("2026-10-16T09:00:04", EventKind::Arrival, Some("Hara"), Outcome::Spoken));
        let path = dir.path().join("2026-10-16.jsonl");
        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file).unwrap();

        assert_eq!(history.load_records("2026-10-16").len(), 1);
    }

    #[test]
    fn report_summarizes_the_day() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::new(dir.path());
        history.save_record(&record("2026-10-16T09:00:04", EventKind::Arrival, Some("Hara"), Outcome::Spoken));
        history.save_record(&record("2026-10-16T12:00:00", EventKind::Chime, None, Outcome::SynthesisFailed));
        history.save_record(&record("2026-10-16T18:30:00", EventKind::Departure, Some("Hara"), Outcome::Spoken));

        let report = history.generate_report("2026-10-16");
        assert!(report.starts_with("# Arrival Announcer Report - 2026-10-16"));
        assert!(report.contains("- **Announcements**: 3"));
        assert!(report.contains("- **Failed**: 1"));
        assert!(report.contains("- **Total audio**: 4.5s"));
        assert!(report.contains("- **First arrival**: 09:00:04"));
        assert!(report.contains("- **Last departure**: 18:30:00"));
        assert!(report.contains("| 12:00:00 | chime | - |"));
        assert!(report.contains("synthesis failed"));
    }

    #[test]
    fn empty_day_has_a_short_report() {
        let dir = tempfile::tempdir().unwrap();
        let report = History::new(dir.path()).generate_report("2026-01-01");
        assert!(report.contains("No announcements recorded."));
    }

    #[test]
    fn helpers() {
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(125.0), "2m 5s");
        assert_eq!(format_duration(7260.0), "2h 1m");
        assert_eq!(truncate("おはようございます", 5), "おは...");
        assert_eq!(time_of("2026-10-16T09:00:04"), "09:00:04");
    }
}
