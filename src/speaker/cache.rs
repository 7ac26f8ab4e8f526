//! Content-addressed phrase cache.
//!
//! Layout: `<root>/<backend_key>/<sha256(text)>.wav`, mono 16-bit PCM.
//! Entries are written once and never rewritten. Anything too small to be a
//! real clip, or that fails to decode, is deleted and reported as a miss.

use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::Synthesized;
use crate::error::Result;

/// Files below this size are leftovers of interrupted writes.
pub const MIN_CACHE_FILE_BYTES: u64 = 1024;

const EXTENSION: &str = "wav";

pub struct AudioCache {
    root: PathBuf,
}

impl AudioCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, backend_key: &str, text: &str) -> PathBuf {
        let digest = Sha256::digest(text.as_bytes());
        self.root
            .join(backend_key)
            .join(format!("{}.{EXTENSION}", hex::encode(digest)))
    }

    pub fn lookup(&self, backend_key: &str, text: &str) -> Option<Synthesized> {
        let path = self.entry_path(backend_key, text);
        let size = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => return None,
        };

        if size < MIN_CACHE_FILE_BYTES {
            warn!("Evicting truncated cache entry {} ({size} bytes)", path.display());
            evict(&path);
            return None;
        }

        match read_wav(&path) {
            Ok(clip) => {
                debug!("Cache hit for {text:?} at {}", path.display());
                Some(clip)
            }
            Err(e) => {
                warn!("Evicting undecodable cache entry {}: {e}", path.display());
                evict(&path);
                None
            }
        }
    }

    /// Persist a clip unless an entry already exists. Concurrent writers
    /// race on a no-clobber rename, so the first complete file wins.
    pub fn store(&self, backend_key: &str, text: &str, clip: &Synthesized) -> Result<()> {
        let path = self.entry_path(backend_key, text);
        if path.exists() {
            return Ok(());
        }

        let dir = self.root.join(backend_key);
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let spec = hound::WavSpec {
                channels: 1,
                sample_rate: clip.sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            };
            let mut writer = hound::WavWriter::new(BufWriter::new(tmp.as_file_mut()), spec)?;
            for &sample in &clip.samples {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        match tmp.persist_noclobber(&path) {
            Ok(_) => {
                debug!("Cached {text:?} at {}", path.display());
                Ok(())
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.error.into()),
        }
    }

    /// Delete every cached clip of one backend.
    pub fn purge(&self, backend_key: &str) -> Result<()> {
        let dir = self.root.join(backend_key);
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Purged cache {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn evict(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove {}: {e}", path.display());
    }
}

fn read_wav(path: &Path) -> Result<Synthesized> {
    let reader = hound::WavReader::open(path)?;
    let sample_rate = reader.spec().sample_rate;
    let samples = reader
        .into_samples::<i16>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Synthesized { samples, sample_rate })
}
