//! Engine-side wrapper over a hardware voice
//!
//! A `Channel` owns one voice for its whole life and knows how to feed it:
//! either a single static buffer or a queue of streaming buffers refilled
//! from an `AudioStream` as the hardware consumes them.

use crate::audio::{AudioFormat, AudioStream, PcmData, SoundBuffer};
use crate::backend::{AudioBackend, Voice, VoiceState};
use chirp_common::Vec3;
use std::sync::Arc;
use tracing::{error, trace, warn};

/// Buffers queued when a stream is first attached
pub const QUEUED_BUFFER_COUNT: usize = 4;

/// Seconds of audio per streaming buffer
const STREAM_BUFFER_SECONDS: u32 = 1;

pub struct Channel {
    voice: Box<dyn Voice>,
    backend: Arc<dyn AudioBackend>,
    stream: Option<Box<dyn AudioStream>>,
    stream_format: Option<AudioFormat>,
    stream_buffer_size: usize,
}

impl Channel {
    pub fn new(voice: Box<dyn Voice>, backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            voice,
            backend,
            stream: None,
            stream_format: None,
            stream_buffer_size: 0,
        }
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.voice.set_volume(volume);
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.voice.set_pitch(pitch);
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.voice.set_position(position);
    }

    pub fn set_relative(&mut self, relative: bool) {
        self.voice.set_relative(relative);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.voice.set_looping(looping);
    }

    pub fn linear_attenuation(&mut self, distance: f32) {
        self.voice.linear_attenuation(distance);
    }

    pub fn disable_attenuation(&mut self) {
        self.voice.disable_attenuation();
    }

    pub fn play(&mut self) {
        self.voice.play();
    }

    pub fn pause(&mut self) {
        if self.voice.state() == VoiceState::Playing {
            self.voice.pause();
        }
    }

    pub fn resume(&mut self) {
        if self.voice.state() == VoiceState::Paused {
            self.voice.resume();
        }
    }

    pub fn stop(&mut self) {
        self.voice.stop();
    }

    pub fn playing(&self) -> bool {
        self.voice.state() == VoiceState::Playing
    }

    /// True once the voice has finished or was stopped. A voice still
    /// waiting for its audio data is not stopped.
    pub fn stopped(&self) -> bool {
        self.voice.state() == VoiceState::Stopped
    }

    /// Attach a fully decoded sound, uploading it on first use.
    pub fn attach_static_buffer(&mut self, buffer: &SoundBuffer) {
        match buffer.upload(self.backend.as_ref()) {
            Ok(id) => self.voice.attach_buffer(id),
            Err(e) => {
                error!("Failed to upload sound buffer: {}", e);
            }
        }
    }

    /// Attach a stream and queue the first buffers.
    pub fn attach_stream(&mut self, stream: Box<dyn AudioStream>) {
        let format = stream.format();
        self.stream_buffer_size = format.bytes_for_seconds(STREAM_BUFFER_SECONDS).max(format.frame_size());
        self.stream_format = Some(format);
        self.stream = Some(stream);
        self.pump_buffers(QUEUED_BUFFER_COUNT);
    }

    /// Refill the queue with as many buffers as the hardware has finished.
    pub fn update_stream(&mut self) {
        if self.stream.is_none() {
            return;
        }
        let processed = self.voice.unqueue_processed();
        if processed > 0 {
            trace!("Refilling {} streaming buffers", processed);
            self.pump_buffers(processed);
        }
    }

    fn pump_buffers(&mut self, count: usize) {
        let (Some(stream), Some(format)) = (self.stream.as_mut(), self.stream_format) else {
            return;
        };

        for _ in 0..count {
            match stream.read(self.stream_buffer_size) {
                Ok(bytes) if bytes.is_empty() => break,
                Ok(bytes) => self.voice.queue_buffer(PcmData::new(format, bytes)),
                Err(e) => {
                    warn!("Failed to read from audio stream: {}", e);
                    break;
                }
            }
        }
    }

    /// Stop the voice and hand it back to its pool.
    pub fn destroy(mut self) {
        self.voice.stop();
        self.stream = None;
        self.backend.release_voice(self.voice);
    }
}
