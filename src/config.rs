//! Configuration management for arrival-announcer.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a missing or partial file still yields a runnable setup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "scans.db".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for cached phrases. Empty means the user cache dir.
    pub dir: String,
}

impl CacheConfig {
    pub fn root(&self) -> PathBuf {
        if !self.dir.is_empty() {
            return PathBuf::from(&self.dir);
        }
        dirs::cache_dir()
            .map(|d| d.join("arrival-announcer"))
            .unwrap_or_else(|| PathBuf::from("voice-cache"))
    }
}

/// Which synthesis backend a voice slot uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Query,
    Hosted,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryBackendConfig {
    pub url: String,
    pub speaker: u32,
    pub sample_rate: u32,
    /// Leading samples to drop from every synthesized clip.
    pub head_trim_samples: usize,
}

impl Default for QueryBackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:50021".into(),
            speaker: 2,
            sample_rate: 24000,
            head_trim_samples: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HostedBackendConfig {
    pub url: String,
    pub api_version: String,
    pub speaker_id: u32,
    pub volume: f32,
    pub speed: f32,
    pub pitch: f32,
    pub range: f32,
    pub anger: f32,
    pub sadness: f32,
    pub joy: f32,
}

impl Default for HostedBackendConfig {
    fn default() -> Self {
        Self {
            url: "https://cloud.ai-j.jp/demo/aitalk2webapi_nop.php".into(),
            api_version: "v5".into(),
            speaker_id: 552,
            volume: 1.0,
            speed: 1.3,
            pitch: 1.0,
            range: 1.0,
            anger: 0.0,
            sadness: 0.0,
            joy: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub default_backend: BackendKind,
    /// Backend used for persons listed in `phrases.regional_persons`.
    pub regional_backend: BackendKind,
    /// Per-request timeout. Unset keeps requests fully blocking.
    pub request_timeout_secs: Option<u64>,
    pub query: QueryBackendConfig,
    pub hosted: HostedBackendConfig,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            default_backend: BackendKind::Query,
            regional_backend: BackendKind::Hosted,
            request_timeout_secs: None,
            query: QueryBackendConfig::default(),
            hosted: HostedBackendConfig::default(),
        }
    }
}

impl VoiceConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnnouncerConfig {
    pub poll_interval_ms: u64,
    pub settle_interval_ms: u64,
    /// Scans closer than this to the first scan of the day never count as a departure.
    pub noise_window_secs: i64,
    /// Run one discarded check at startup so people already present are not re-announced.
    pub prime_on_startup: bool,
}

impl Default for AnnouncerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            settle_interval_ms: 1000,
            noise_window_secs: crate::presence::DEFAULT_NOISE_WINDOW_SECS,
            prime_on_startup: true,
        }
    }
}

impl AnnouncerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    pub fn noise_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.noise_window_secs)
    }
}

/// Maps a person id to the spoken form of their name when `pattern` occurs in it.
#[derive(Debug, Clone, Deserialize)]
pub struct HonorificRule {
    pub pattern: String,
    pub spoken: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhrasesConfig {
    pub morning: String,
    pub afternoon: String,
    pub evening: String,
    pub farewell: String,
    pub morning_until_hour: u32,
    pub afternoon_until_hour: u32,
    /// Checked in order; first match wins.
    pub honorifics: Vec<HonorificRule>,
    pub regional_persons: Vec<String>,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            morning: "おはようございます".into(),
            afternoon: "こんにちは".into(),
            evening: "こんばんは".into(),
            farewell: "お疲れ様でした".into(),
            morning_until_hour: 11,
            afternoon_until_hour: 17,
            honorifics: vec![],
            regional_persons: vec![],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChimeEntry {
    pub hour: u32,
    pub minute: u32,
    #[serde(default = "default_weekdays_only")]
    pub weekdays_only: bool,
    pub phrases: Vec<String>,
}

fn default_weekdays_only() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChimesConfig {
    pub enabled: bool,
    pub schedule: Vec<ChimeEntry>,
}

impl Default for ChimesConfig {
    fn default() -> Self {
        let entry = |hour, minute, phrases: &[&str]| ChimeEntry {
            hour,
            minute,
            weekdays_only: true,
            phrases: phrases.iter().map(|p| p.to_string()).collect(),
        };
        Self {
            enabled: false,
            schedule: vec![
                entry(9, 0, &["おはようございます", "9時になりました", "今日も1日、頑張りましょう"]),
                entry(12, 0, &["お昼の時間です"]),
                entry(17, 30, &["定時になりました", "明日も頑張りましょう"]),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Empty means ~/.arrival-announcer-history.
    pub dir: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: String::new(),
        }
    }
}

impl HistoryConfig {
    pub fn root(&self) -> PathBuf {
        if !self.dir.is_empty() {
            return PathBuf::from(&self.dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".arrival-announcer-history")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub voice: VoiceConfig,
    pub announcer: AnnouncerConfig,
    pub phrases: PhrasesConfig,
    pub chimes: ChimesConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/arrival-announcer/config.yaml
    /// 3. /etc/arrival-announcer/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/arrival-announcer/config.yaml")),
                Some(PathBuf::from("/etc/arrival-announcer/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let yaml = r#"
voice:
  default_backend: hosted
  query:
    speaker: 8
announcer:
  noise_window_secs: 120
phrases:
  honorifics:
    - pattern: Kuwano
      spoken: クワノ先生
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.voice.default_backend, BackendKind::Hosted);
        assert_eq!(config.voice.regional_backend, BackendKind::Hosted);
        assert_eq!(config.voice.query.speaker, 8);
        assert_eq!(config.voice.query.sample_rate, 24000);
        assert_eq!(config.announcer.noise_window(), chrono::Duration::minutes(2));
        assert_eq!(config.announcer.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.phrases.honorifics.len(), 1);
        assert_eq!(config.phrases.farewell, "お疲れ様でした");
        assert!(config.voice.request_timeout().is_none());
    }

    #[test]
    fn chime_entries_default_to_weekdays() {
        let yaml = r#"
chimes:
  enabled: true
  schedule:
    - hour: 10
      minute: 15
      phrases: [break time]
"#;
        let config = Config::parse(yaml).unwrap();
        assert!(config.chimes.enabled);
        assert_eq!(config.chimes.schedule.len(), 1);
        assert!(config.chimes.schedule[0].weekdays_only);
    }

    #[test]
    fn example_config_parses() {
        let config = Config::parse(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.phrases.honorifics.len(), 18);
        assert_eq!(config.phrases.honorifics[0].pattern, "Kuwano");
        assert_eq!(config.phrases.honorifics[0].spoken, "クワノ先生");
        assert_eq!(config.chimes.schedule.len(), 3);
        assert!(config.chimes.schedule.iter().all(|c| c.weekdays_only));
        assert_eq!(config.voice.hosted.speaker_id, 552);
        assert_eq!(config.announcer.noise_window(), chrono::Duration::minutes(5));

        let book = crate::phrases::Phrasebook::new(config.phrases);
        assert_eq!(book.honorific("Yutaro Hara"), "ハラさん");
        assert_eq!(book.honorific("Naqi Ali"), "アリさん");
    }

    #[test]
    fn explicit_cache_dir_wins() {
        let cache = CacheConfig {
            dir: "/tmp/voices".into(),
        };
        assert_eq!(cache.root(), PathBuf::from("/tmp/voices"));
    }
}
