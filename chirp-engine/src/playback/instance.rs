//! Sound instances
//!
//! A sound instance is the caller's description of something that wants to
//! make a sound. The engine holds a reference to it only while it is active.

use chirp_common::{ResourceLocation, SoundSource, Vec3, WeighedSoundEvents};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Distance attenuation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attenuation {
    /// No distance falloff
    None,
    /// Linear falloff to silence at the sound's attenuation distance
    #[default]
    Linear,
}

pub trait SoundInstance: Send + Sync {
    /// Sound event to resolve through the registry
    fn location(&self) -> &ResourceLocation;
    fn source(&self) -> SoundSource;

    fn is_looping(&self) -> bool {
        false
    }

    /// Position is relative to the listener
    fn is_relative(&self) -> bool {
        false
    }

    /// Ticks to wait before restarting a looping sound
    fn delay(&self) -> u64 {
        0
    }

    fn volume(&self) -> f32 {
        1.0
    }

    fn pitch(&self) -> f32 {
        1.0
    }

    fn position(&self) -> Vec3 {
        Vec3::ZERO
    }

    fn attenuation(&self) -> Attenuation {
        Attenuation::Linear
    }

    fn can_play_sound(&self) -> bool {
        true
    }

    /// May start even when its computed volume is zero
    fn can_start_silent(&self) -> bool {
        false
    }

    /// Per-tick behaviour, if this instance has any
    fn as_tickable(&self) -> Option<&dyn TickableSoundInstance> {
        None
    }
}

/// Sound instance updated once per simulation tick.
pub trait TickableSoundInstance: SoundInstance {
    fn tick(&self);
    fn is_stopped(&self) -> bool;
}

/// Observer notified whenever a sound is about to start.
pub trait SoundEventListener: Send + Sync {
    /// `range` is the audible distance, infinite for non-attenuated sounds.
    fn on_play_sound(&self, instance: &dyn SoundInstance, events: &WeighedSoundEvents, range: f32);
}

/// Fixed-parameter sound instance
#[derive(Debug, Clone)]
pub struct SimpleSoundInstance {
    location: ResourceLocation,
    source: SoundSource,
    volume: f32,
    pitch: f32,
    position: Vec3,
    looping: bool,
    delay: u64,
    relative: bool,
    attenuation: Attenuation,
}

impl SimpleSoundInstance {
    /// Positioned sound with linear attenuation
    pub fn new(
        location: ResourceLocation,
        source: SoundSource,
        volume: f32,
        pitch: f32,
        position: Vec3,
    ) -> Self {
        Self {
            location,
            source,
            volume,
            pitch,
            position,
            looping: false,
            delay: 0,
            relative: false,
            attenuation: Attenuation::Linear,
        }
    }

    /// Listener-relative UI sound without attenuation
    pub fn for_ui(location: ResourceLocation, volume: f32, pitch: f32) -> Self {
        Self::new(location, SoundSource::Master, volume, pitch, Vec3::ZERO)
            .with_relative(true)
            .with_attenuation(Attenuation::None)
    }

    /// Background music track
    pub fn for_music(location: ResourceLocation) -> Self {
        Self::new(location, SoundSource::Music, 1.0, 1.0, Vec3::ZERO)
            .with_relative(true)
            .with_attenuation(Attenuation::None)
    }

    pub fn with_looping(mut self, looping: bool, delay: u64) -> Self {
        self.looping = looping;
        self.delay = delay;
        self
    }

    pub fn with_relative(mut self, relative: bool) -> Self {
        self.relative = relative;
        self
    }

    pub fn with_attenuation(mut self, attenuation: Attenuation) -> Self {
        self.attenuation = attenuation;
        self
    }
}

impl SoundInstance for SimpleSoundInstance {
    fn location(&self) -> &ResourceLocation {
        &self.location
    }

    fn source(&self) -> SoundSource {
        self.source
    }

    fn is_looping(&self) -> bool {
        self.looping
    }

    fn is_relative(&self) -> bool {
        self.relative
    }

    fn delay(&self) -> u64 {
        self.delay
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn pitch(&self) -> f32 {
        self.pitch
    }

    fn position(&self) -> Vec3 {
        self.position
    }

    fn attenuation(&self) -> Attenuation {
        self.attenuation
    }
}

/// Sound whose volume, pitch and position can be changed while it plays.
///
/// Each tick the engine pushes the current values to the channel.
#[derive(Debug)]
pub struct MovingSoundInstance {
    base: SimpleSoundInstance,
    state: Mutex<MovingState>,
    stopped: AtomicBool,
}

#[derive(Debug, Clone, Copy)]
struct MovingState {
    volume: f32,
    pitch: f32,
    position: Vec3,
}

impl MovingSoundInstance {
    pub fn new(base: SimpleSoundInstance) -> Self {
        let state = MovingState {
            volume: base.volume,
            pitch: base.pitch,
            position: base.position,
        };
        Self {
            base,
            state: Mutex::new(state),
            stopped: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MovingState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, f: impl FnOnce(&mut MovingState)) {
        f(&mut self.state.lock().unwrap_or_else(|e| e.into_inner()));
    }

    pub fn set_volume(&self, volume: f32) {
        self.update(|s| s.volume = volume);
    }

    pub fn set_pitch(&self, pitch: f32) {
        self.update(|s| s.pitch = pitch);
    }

    pub fn set_position(&self, position: Vec3) {
        self.update(|s| s.position = position);
    }

    /// Ask the engine to stop this sound on its next tick.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl SoundInstance for MovingSoundInstance {
    fn location(&self) -> &ResourceLocation {
        self.base.location()
    }

    fn source(&self) -> SoundSource {
        self.base.source()
    }

    fn is_looping(&self) -> bool {
        self.base.is_looping()
    }

    fn is_relative(&self) -> bool {
        self.base.is_relative()
    }

    fn delay(&self) -> u64 {
        self.base.delay()
    }

    fn volume(&self) -> f32 {
        self.state().volume
    }

    fn pitch(&self) -> f32 {
        self.state().pitch
    }

    fn position(&self) -> Vec3 {
        self.state().position
    }

    fn attenuation(&self) -> Attenuation {
        self.base.attenuation()
    }

    fn can_play_sound(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    fn as_tickable(&self) -> Option<&dyn TickableSoundInstance> {
        Some(self)
    }
}

impl TickableSoundInstance for MovingSoundInstance {
    fn tick(&self) {}

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
