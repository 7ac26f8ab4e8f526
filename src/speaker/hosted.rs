//! Hosted-file backend (AITalk-style web API).
//!
//! The service renders the text to a WAV file on its side and answers with a
//! JSONP envelope pointing at it: `callback({"url":"//host/path.wav"})`. We
//! unwrap the envelope, download the file, and cut the silent lead-in the
//! service puts in front of every clip.

use serde::Deserialize;
use tracing::debug;

use super::{decode_wav, ensure_success, Synthesized};
use crate::config::HostedBackendConfig;
use crate::error::{Error, Result};

/// Window energy (sum of absolute samples) below which a window is silent.
pub const SILENCE_ENERGY_THRESHOLD: u64 = 1;

#[derive(Deserialize)]
struct RenderedFile {
    url: String,
}

pub struct HostedFileBackend {
    client: reqwest::Client,
    params: HostedBackendConfig,
}

impl HostedFileBackend {
    pub fn new(client: reqwest::Client, config: &HostedBackendConfig) -> Self {
        Self {
            client,
            params: config.clone(),
        }
    }

    pub fn backend_key(&self) -> String {
        format!("hosted-speaker{}", self.params.speaker_id)
    }

    pub async fn synthesize(&self, text: &str) -> Result<Synthesized> {
        let file_url = self.request_render(text).await?;
        debug!("Downloading rendered clip {file_url}");

        let response = self.client.get(&file_url).send().await?;
        let audio = ensure_success(response, "clip download").await?.bytes().await?;

        let clip = decode_wav(&audio)?;
        let samples = trim_leading_silence(&clip.samples, clip.sample_rate).to_vec();
        debug!(
            "Synthesized {text:?}: {} of {} samples kept at {} Hz",
            samples.len(),
            clip.samples.len(),
            clip.sample_rate
        );
        Ok(Synthesized {
            samples,
            sample_rate: clip.sample_rate,
        })
    }

    async fn request_render(&self, text: &str) -> Result<String> {
        let p = &self.params;
        let form = [
            ("api-version", p.api_version.clone()),
            ("speaker_id", p.speaker_id.to_string()),
            ("text", text.to_string()),
            ("ext", "wav".to_string()),
            ("volume", format!("{:.1}", p.volume)),
            ("speed", format!("{:.1}", p.speed)),
            ("pitch", format!("{:.1}", p.pitch)),
            ("range", format!("{:.1}", p.range)),
            ("anger", format!("{:.1}", p.anger)),
            ("sadness", format!("{:.1}", p.sadness)),
            ("joy", format!("{:.1}", p.joy)),
            ("callback", "callback".to_string()),
        ];

        let response = self.client.post(&p.url).form(&form).send().await?;
        let body = ensure_success(response, "render request").await?.text().await?;
        let rendered: RenderedFile = serde_json::from_str(unwrap_callback(&body)?)?;
        absolute_url(&rendered.url, &p.url)
    }
}

/// Strip a `name( ... )` JSONP envelope.
fn unwrap_callback(body: &str) -> Result<&str> {
    let start = body.find('(');
    let end = body.rfind(')');
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(body[start + 1..end].trim()),
        _ => Err(Error::Synthesis(format!("unexpected render response: {body}"))),
    }
}

/// Resolve a protocol-relative URL against the service's scheme.
fn absolute_url(url: &str, service_url: &str) -> Result<String> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(url.to_string());
    }
    if let Some(rest) = url.strip_prefix("//") {
        let scheme = service_url.split("://").next().unwrap_or("https");
        return Ok(format!("{scheme}://{rest}"));
    }
    Err(Error::Synthesis(format!("render response has unusable url {url:?}")))
}

/// Skip to the end of the first silent half-second window.
///
/// Windows are `rate / 2` samples long and advance by `rate / 20`. Without a
/// silent window the clip is returned whole.
pub fn trim_leading_silence(samples: &[i16], sample_rate: u32) -> &[i16] {
    let window = (sample_rate / 2) as usize;
    let stride = ((sample_rate / 20) as usize).max(1);
    if window == 0 || samples.len() <= window {
        return samples;
    }

    for start in (0..samples.len() - window).step_by(stride) {
        let energy: u64 = samples[start..start + window]
            .iter()
            .map(|s| u64::from(s.unsigned_abs()))
            .sum();
        if energy < SILENCE_ENERGY_THRESHOLD {
            return &samples[start + window..];
        }
    }
    samples
}
