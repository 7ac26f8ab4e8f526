//! Audio output.

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamBuilder, Sink};
use tracing::debug;

use crate::error::{Error, Result};

/// Hands a mono clip to an audio device.
pub trait PlaySamples {
    /// Returns once the device has accepted the buffer. Callers that need
    /// the clip to finish wait for its duration themselves.
    fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<()>;
}

/// Plays through the default output device.
pub struct RodioPlayer {
    // In rodio 0.21, OutputStream is the handle and must outlive every sink
    stream: OutputStream,
    sink: Option<Sink>,
}

impl RodioPlayer {
    pub fn open() -> Result<Self> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| Error::Playback(format!("failed to open audio output: {e}")))?;
        Ok(Self { stream, sink: None })
    }
}

impl PlaySamples for RodioPlayer {
    fn play(&mut self, samples: &[i16], sample_rate: u32) -> Result<()> {
        if samples.is_empty() || sample_rate == 0 {
            return Err(Error::Playback(format!(
                "refusing to play {} samples at {sample_rate} Hz",
                samples.len()
            )));
        }

        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(SamplesBuffer::new(1, sample_rate, to_f32(samples)));
        debug!("Queued {} samples at {sample_rate} Hz", samples.len());

        // Dropping a sink stops it, so keep this one until the next clip.
        self.sink = Some(sink);
        Ok(())
    }
}

fn to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| f32::from(s) / 32768.0).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_maps_into_unit_range() {
        let out = to_f32(&[0, 16384, -16384, i16::MIN, i16::MAX]);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[1], 0.5);
        assert_eq!(out[2], -0.5);
        assert_eq!(out[3], -1.0);
        assert!(out[4] < 1.0 && out[4] > 0.999);
    }
}
