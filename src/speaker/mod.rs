//! Speech synthesis with an on-disk phrase cache.
//!
//! Components:
//! - `cache`: content-addressed WAV store, one directory per backend
//! - `query`: two-step query/synthesis engine returning raw PCM
//! - `hosted`: web API that renders a hosted WAV file, silence-trimmed
//! - `voice`: cache-first phrase synthesis and sentence concatenation

pub mod cache;
pub mod hosted;
pub mod query;
pub mod voice;

use std::io::Cursor;
use std::time::Duration;

use crate::config::{BackendKind, VoiceConfig};
use crate::error::{Error, Result};

pub use cache::AudioCache;
pub use hosted::HostedFileBackend;
pub use query::QueryBackend;
pub use voice::{VoiceMode, VoiceService};

/// Mono 16-bit PCM clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesized {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Synthesized {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// The two supported synthesis services.
pub enum SynthesisBackend {
    Query(QueryBackend),
    Hosted(HostedFileBackend),
}

impl SynthesisBackend {
    pub fn from_config(kind: BackendKind, config: &VoiceConfig) -> Result<Self> {
        let client = http_client(config.request_timeout())?;
        Ok(match kind {
            BackendKind::Query => Self::Query(QueryBackend::new(client, &config.query)),
            BackendKind::Hosted => Self::Hosted(HostedFileBackend::new(client, &config.hosted)),
        })
    }

    /// Cache partition for this backend. Includes the speaker so that
    /// changing voices never serves another speaker's audio.
    pub fn backend_key(&self) -> String {
        match self {
            Self::Query(b) => b.backend_key(),
            Self::Hosted(b) => b.backend_key(),
        }
    }

    pub async fn synthesize(&self, text: &str) -> Result<Synthesized> {
        match self {
            Self::Query(b) => b.synthesize(text).await,
            Self::Hosted(b) => b.synthesize(text).await,
        }
    }
}

fn http_client(timeout: Option<Duration>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))
}

/// Fail with the response body when the service did not return 2xx.
async fn ensure_success(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Synthesis(format!("{what} returned {status}: {body}")))
}

/// Decode a 16-bit PCM WAV, averaging channels down to mono.
fn decode_wav(bytes: &[u8]) -> Result<Synthesized> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Synthesis(format!("undecodable wav: {e}")))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int || spec.bits_per_sample != 16 {
        return Err(Error::Synthesis(format!(
            "unsupported wav format: {:?} {} bits",
            spec.sample_format, spec.bits_per_sample
        )));
    }

    let interleaved = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Synthesis(format!("truncated wav: {e}")))?;

    let channels = usize::from(spec.channels.max(1));
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect()
    };

    Ok(Synthesized {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub async fn serve(app: axum::Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    pub fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::wav_bytes;
    use super::*;

    #[test]
    fn duration_follows_rate() {
        let clip = Synthesized {
            samples: vec![0; 36000],
            sample_rate: 24000,
        };
        assert_eq!(clip.duration(), Duration::from_millis(1500));
    }

    #[test]
    fn stereo_wav_is_downmixed() {
        let bytes = wav_bytes(&[100, 300, -50, -150], 22050, 2);
        let clip = decode_wav(&bytes).unwrap();
        assert_eq!(clip.sample_rate, 22050);
        assert_eq!(clip.samples, vec![200, -100]);
    }

    #[test]
    fn garbage_is_a_synthesis_error() {
        let err = decode_wav(b"not a wav file").unwrap_err();
        assert!(matches!(err, Error::Synthesis(_)));
    }

    #[test]
    fn backend_keys_track_speaker() {
        let mut config = VoiceConfig::default();
        let a = SynthesisBackend::from_config(BackendKind::Query, &config).unwrap();
        config.query.speaker = 3;
        let b = SynthesisBackend::from_config(BackendKind::Query, &config).unwrap();
        let c = SynthesisBackend::from_config(BackendKind::Hosted, &config).unwrap();

        assert_eq!(a.backend_key(), "query-speaker2-24000");
        assert_eq!(b.backend_key(), "query-speaker3-24000");
        assert_eq!(c.backend_key(), "hosted-speaker552");
    }

    #[test]
    fn changing_the_query_rate_changes_the_partition() {
        let mut config = VoiceConfig::default();
        let before = SynthesisBackend::from_config(BackendKind::Query, &config).unwrap();
        config.query.sample_rate = 48000;
        let after = SynthesisBackend::from_config(BackendKind::Query, &config).unwrap();

        assert_eq!(after.backend_key(), "query-speaker2-48000");
        assert_ne!(before.backend_key(), after.backend_key());
    }
}
