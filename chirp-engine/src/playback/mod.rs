//! Playback engine, channel access and the sound buffer cache

pub mod active;
pub mod buffer_library;
pub mod channel;
pub mod channel_access;
pub mod device_check;
pub mod engine;
pub mod executor;
pub mod instance;

pub use buffer_library::SoundBufferLibrary;
pub use channel::Channel;
pub use channel_access::{ChannelAccess, ChannelHandle};
pub use engine::{PlayResult, SoundEngine, SoundId};
pub use instance::{
    Attenuation, MovingSoundInstance, SimpleSoundInstance, SoundEventListener, SoundInstance,
    TickableSoundInstance,
};
