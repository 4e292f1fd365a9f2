//! Audio data types shared by the decoder, cache and channels

use crate::backend::{AudioBackend, BufferId};
use crate::error::Result;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// PCM layout of decoded audio.
///
/// Decoded audio is always signed 16-bit little-endian, interleaved in
/// channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Bytes per sample (signed 16-bit)
    pub const BYTES_PER_SAMPLE: usize = 2;

    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Bytes per interleaved frame
    pub fn frame_size(&self) -> usize {
        self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    /// Frame-aligned byte count covering `seconds` of audio
    pub fn bytes_for_seconds(&self, seconds: u32) -> usize {
        self.sample_rate as usize * self.frame_size() * seconds as usize
    }

    /// Playback duration of `bytes` of PCM in this format
    pub fn duration_of(&self, bytes: usize) -> Duration {
        let frame_size = self.frame_size();
        if frame_size == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (bytes / frame_size) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / self.sample_rate as u64)
    }
}

/// Decoded PCM with its format
#[derive(Debug, Clone, PartialEq)]
pub struct PcmData {
    pub format: AudioFormat,
    pub bytes: Vec<u8>,
}

impl PcmData {
    pub fn new(format: AudioFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    pub fn duration(&self) -> Duration {
        self.format.duration_of(self.bytes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Fully decoded sound, shared between every channel that plays it.
///
/// The hardware-side copy is created lazily on first attachment and
/// released explicitly when the buffer cache is cleared.
#[derive(Debug)]
pub struct SoundBuffer {
    pcm: PcmData,
    hardware: Mutex<Option<BufferId>>,
}

impl SoundBuffer {
    pub fn new(pcm: PcmData) -> Self {
        Self {
            pcm,
            hardware: Mutex::new(None),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.pcm.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.pcm.bytes
    }

    pub fn duration(&self) -> Duration {
        self.pcm.duration()
    }

    /// Hardware buffer for this sound, uploading on first use.
    pub fn upload(&self, backend: &dyn AudioBackend) -> Result<BufferId> {
        let mut hardware = self.hardware.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = *hardware {
            return Ok(id);
        }
        let id = backend.upload_buffer(&self.pcm)?;
        debug!("Uploaded {} bytes as hardware buffer {:?}", self.pcm.bytes.len(), id);
        *hardware = Some(id);
        Ok(id)
    }

    /// Release the hardware-side copy, if any. Safe to call repeatedly.
    pub fn discard(&self, backend: &dyn AudioBackend) {
        let mut hardware = self.hardware.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = hardware.take() {
            backend.delete_buffer(id);
        }
    }

    pub fn is_uploaded(&self) -> bool {
        self.hardware
            .lock()
            .map(|h| h.is_some())
            .unwrap_or(false)
    }
}

/// Incremental source of PCM data.
pub trait AudioStream: Send {
    fn format(&self) -> AudioFormat;

    /// Read at least `expected_size` bytes, or fewer if the stream ends.
    ///
    /// An empty result means the stream is exhausted.
    fn read(&mut self, expected_size: usize) -> Result<Vec<u8>>;
}
