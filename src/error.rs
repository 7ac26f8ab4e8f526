//! Error types for arrival-announcer

use thiserror::Error;

/// Result type alias for announcer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while tracking presence and speaking announcements
#[derive(Debug, Error)]
pub enum Error {
    /// Scan query failed or the store is unreachable
    #[error("data source error: {0}")]
    DataSource(String),

    /// TTS backend failed, timed out, or returned undecodable audio
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio device unavailable or rejected the buffer
    #[error("playback error: {0}")]
    Playback(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV encode/decode error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::DataSource(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Synthesis(format!("request timed out: {e}"))
        } else {
            Self::Synthesis(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Synthesis(format!("malformed response: {e}"))
    }
}
