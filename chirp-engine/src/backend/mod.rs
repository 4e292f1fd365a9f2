//! Hardware mixer abstraction
//!
//! The engine never talks to an audio API directly. A backend exposes a
//! bounded pool of voices (hardware playback channels), hardware-side
//! buffer storage, the listener, and device queries. Voices are only ever
//! touched from the command thread.

pub mod headless;

pub use headless::HeadlessBackend;

use crate::audio::PcmData;
use crate::error::Result;
use chirp_common::Vec3;

/// Which voice pool a channel is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolKind {
    /// Fully decoded, single attached buffer
    Static,
    /// Fed incrementally through a buffer queue
    Streaming,
}

/// Handle to a hardware-side buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Playback state reported by a voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Initial,
    Playing,
    Paused,
    Stopped,
}

/// Listener orientation and position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListenerTransform {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for ListenerTransform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::new(0.0, 1.0, 0.0),
        }
    }
}

/// Pool sizes requested when opening a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub static_channels: usize,
    pub streaming_channels: usize,
}

/// Current voice pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolUsage {
    pub static_used: usize,
    pub static_max: usize,
    pub streaming_used: usize,
    pub streaming_max: usize,
}

/// A single hardware playback channel.
pub trait Voice: Send {
    fn set_volume(&mut self, volume: f32);
    fn set_pitch(&mut self, pitch: f32);
    fn set_position(&mut self, position: Vec3);
    fn set_relative(&mut self, relative: bool);
    fn set_looping(&mut self, looping: bool);

    /// Attenuate linearly to silence at `distance`
    fn linear_attenuation(&mut self, distance: f32);
    fn disable_attenuation(&mut self);

    /// Attach a fully decoded buffer (static voices)
    fn attach_buffer(&mut self, buffer: BufferId);

    /// Append PCM to the playback queue (streaming voices)
    fn queue_buffer(&mut self, pcm: PcmData);

    /// Drop fully played queued buffers, returning how many were removed
    fn unqueue_processed(&mut self) -> usize;

    fn play(&mut self);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    fn state(&self) -> VoiceState;
}

/// Connection to an output device and its voice pools.
pub trait AudioBackend: Send + Sync {
    /// Open `device` (or the system default when `None`).
    fn open(&self, device: Option<&str>, limits: PoolLimits) -> Result<()>;

    /// Close the device; outstanding voices become invalid.
    fn close(&self);

    /// Take a free voice from `kind`'s pool, `None` when exhausted.
    fn acquire_voice(&self, kind: PoolKind) -> Option<Box<dyn Voice>>;

    /// Return a voice to its pool.
    fn release_voice(&self, voice: Box<dyn Voice>);

    fn upload_buffer(&self, pcm: &PcmData) -> Result<BufferId>;
    fn delete_buffer(&self, buffer: BufferId);

    /// Cheap check, polled every tick
    fn is_current_device_disconnected(&self) -> bool;

    /// Expensive check; only called from a background worker
    fn has_default_device_changed(&self) -> bool;

    fn current_device_name(&self) -> Option<String>;

    /// Expensive; only called from a background worker or on request
    fn available_devices(&self) -> Vec<String>;

    fn set_listener(&self, transform: &ListenerTransform);
    fn pool_usage(&self) -> PoolUsage;
}
