//! Query/synthesis engine backend (VOICEVOX-compatible HTTP API).
//!
//! `POST /audio_query` turns text into a synthesis plan, `POST /synthesis`
//! renders that plan. The engine answers with either a WAV file or bare
//! little-endian 16-bit PCM at the configured rate.

use tracing::debug;

use super::{decode_wav, ensure_success, Synthesized};
use crate::config::QueryBackendConfig;
use crate::error::{Error, Result};

pub struct QueryBackend {
    client: reqwest::Client,
    base_url: String,
    speaker: u32,
    sample_rate: u32,
    head_trim_samples: usize,
}

impl QueryBackend {
    pub fn new(client: reqwest::Client, config: &QueryBackendConfig) -> Self {
        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            speaker: config.speaker,
            sample_rate: config.sample_rate,
            head_trim_samples: config.head_trim_samples,
        }
    }

    /// Cached clips keep the rate they were made at, so the rate is part of
    /// the partition.
    pub fn backend_key(&self) -> String {
        format!("query-speaker{}-{}", self.speaker, self.sample_rate)
    }

    pub async fn synthesize(&self, text: &str) -> Result<Synthesized> {
        let speaker = self.speaker.to_string();

        let response = self
            .client
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await?;
        let plan: serde_json::Value = ensure_success(response, "audio_query").await?.json().await?;

        let response = self
            .client
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker.as_str())])
            .json(&plan)
            .send()
            .await?;
        let audio = ensure_success(response, "synthesis").await?.bytes().await?;

        let mut clip = self.decode(&audio)?;
        let trim = self.head_trim_samples.min(clip.samples.len());
        clip.samples.drain(..trim);

        debug!(
            "Synthesized {text:?}: {} samples at {} Hz",
            clip.samples.len(),
            clip.sample_rate
        );
        Ok(clip)
    }

    fn decode(&self, audio: &[u8]) -> Result<Synthesized> {
        if audio.starts_with(b"RIFF") {
            return decode_wav(audio);
        }
        if audio.is_empty() || audio.len() % 2 != 0 {
            return Err(Error::Synthesis(format!(
                "engine returned {} bytes, not 16-bit PCM",
                audio.len()
            )));
        }
        let samples = audio
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Synthesized {
            samples,
            sample_rate: self.sample_rate,
        })
    }
}
