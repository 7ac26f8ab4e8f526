//! Cache-first sentence synthesis.
//!
//! A sentence is an explicit list of phrases. Each phrase is looked up in the
//! cache under the selected backend's key and synthesized only on a miss.
//! Caching each phrase separately lets names and greetings be reused across
//! sentences.

use std::time::Instant;

use tracing::{debug, info, warn};

use super::{AudioCache, SynthesisBackend, Synthesized};
use crate::config::VoiceConfig;
use crate::error::{Error, Result};

/// Which voice a sentence is spoken in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VoiceMode {
    #[default]
    Standard,
    Regional,
}

pub struct VoiceService {
    cache: AudioCache,
    standard: SynthesisBackend,
    regional: SynthesisBackend,
}

impl VoiceService {
    pub fn new(cache: AudioCache, standard: SynthesisBackend, regional: SynthesisBackend) -> Self {
        Self {
            cache,
            standard,
            regional,
        }
    }

    pub fn from_config(cache: AudioCache, config: &VoiceConfig) -> Result<Self> {
        let standard = SynthesisBackend::from_config(config.default_backend, config)?;
        let regional = SynthesisBackend::from_config(config.regional_backend, config)?;
        info!(
            "Voice backends: standard={} regional={} (cache at {})",
            standard.backend_key(),
            regional.backend_key(),
            cache.root().display()
        );
        Ok(Self::new(cache, standard, regional))
    }

    pub fn backend(&self, mode: VoiceMode) -> &SynthesisBackend {
        match mode {
            VoiceMode::Standard => &self.standard,
            VoiceMode::Regional => &self.regional,
        }
    }

    /// Synthesize `phrases` in order and join them into one clip.
    ///
    /// Fails if any phrase fails, so a sentence is never played half-spoken.
    pub async fn speak(&self, phrases: &[String], mode: VoiceMode) -> Result<Synthesized> {
        let backend = self.backend(mode);
        let mut samples = Vec::new();
        let mut sample_rate = None;

        for text in phrases {
            let clip = self.phrase(backend, text).await?;
            match sample_rate {
                None => sample_rate = Some(clip.sample_rate),
                Some(rate) if rate != clip.sample_rate => {
                    return Err(Error::Synthesis(format!(
                        "{text:?} came back at {} Hz, sentence is {rate} Hz",
                        clip.sample_rate
                    )));
                }
                Some(_) => {}
            }
            samples.extend(clip.samples);
        }

        let sample_rate = sample_rate.ok_or_else(|| Error::Synthesis("empty sentence".into()))?;
        Ok(Synthesized {
            samples,
            sample_rate,
        })
    }

    /// Make sure every phrase is cached. Returns how many were synthesized.
    pub async fn prepare(&self, phrases: &[String], mode: VoiceMode) -> usize {
        let backend = self.backend(mode);
        let key = backend.backend_key();
        let mut synthesized = 0;

        for text in phrases {
            if self.cache.lookup(&key, text).is_some() {
                continue;
            }
            match self.phrase(backend, text).await {
                Ok(_) => synthesized += 1,
                Err(e) => warn!("Failed to prepare {text:?}: {e}"),
            }
        }
        synthesized
    }

    pub fn purge(&self, mode: VoiceMode) -> Result<()> {
        self.cache.purge(&self.backend(mode).backend_key())
    }

    async fn phrase(&self, backend: &SynthesisBackend, text: &str) -> Result<Synthesized> {
        let key = backend.backend_key();
        if let Some(clip) = self.cache.lookup(&key, text) {
            return Ok(clip);
        }

        debug!("Cache miss for {text:?} ({key}), synthesizing");
        let t0 = Instant::now();
        let clip = backend.synthesize(text).await?;
        info!(
            "Synthesized {text:?} with {key} in {}ms",
            t0.elapsed().as_millis()
        );

        if let Err(e) = self.cache.store(&key, text, &clip) {
            warn!("Failed to cache {text:?}: {e}");
        }
        Ok(clip)
    }
}
