//! Sound engine
//!
//! The single authority over which sounds are active. Driven from the
//! simulation thread: `play`/`stop` on demand and `tick` once per simulation
//! tick. Hardware work is delegated to the channel access layer and decoding
//! to the buffer library, so neither call path blocks on audio I/O beyond the
//! bounded channel acquisition hand-off.
//!
//! **Lifecycle:**
//! - `new` opens the output device; failure leaves the engine unloaded and
//!   every call becomes a no-op
//! - `reload` tears everything down and opens the device again
//! - `destroy` releases every channel and cached buffer

use super::active::{ActiveSound, SoundArena};
use super::buffer_library::SoundBufferLibrary;
use super::channel::Channel;
use super::channel_access::ChannelAccess;
use super::device_check::DeviceMonitor;
use super::instance::{Attenuation, SoundEventListener, SoundInstance};
use crate::backend::{AudioBackend, ListenerTransform, PoolKind, PoolLimits};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::resources::ResourceProvider;
use chirp_common::{ResourceLocation, Sound, SoundRegistry, SoundSource};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, trace, warn};

pub use super::active::SoundId;

/// Lowest pitch multiplier passed to a channel
const MIN_PITCH: f32 = 0.5;

/// Highest pitch multiplier passed to a channel
const MAX_PITCH: f32 = 2.0;

/// Outcome of a play attempt. `NotStarted` is a normal result, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayResult {
    Started(SoundId),
    /// Started with zero volume (e.g. muted category)
    StartedSilently(SoundId),
    NotStarted,
}

impl PlayResult {
    pub fn id(&self) -> Option<SoundId> {
        match self {
            PlayResult::Started(id) | PlayResult::StartedSilently(id) => Some(*id),
            PlayResult::NotStarted => None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.id().is_some()
    }
}

fn should_loop_manually(instance: &dyn SoundInstance) -> bool {
    instance.is_looping() && instance.delay() > 0
}

fn should_loop_automatically(instance: &dyn SoundInstance) -> bool {
    instance.is_looping() && instance.delay() == 0
}

/// Log `message` for `location` only the first time it is seen.
fn warn_once(seen: &mut HashSet<ResourceLocation>, location: &ResourceLocation, message: &str) {
    if seen.insert(location.clone()) {
        warn!("{}: {}", message, location);
    }
}

pub struct SoundEngine {
    config: EngineConfig,
    backend: Arc<dyn AudioBackend>,
    registry: SoundRegistry,
    channel_access: ChannelAccess,
    library: SoundBufferLibrary,
    loaded: bool,
    tick_count: u64,

    /// Per-sound state, keyed by `SoundId`
    sounds: SoundArena,

    /// Active sounds per category
    by_source: HashMap<SoundSource, Vec<SoundId>>,

    /// Active sounds that are ticked every frame
    tickables: Vec<SoundId>,

    /// Tickable sounds waiting for their first tick
    queued_tickables: Vec<SoundId>,

    /// Reserved sounds and the tick at which they start
    delayed: HashMap<SoundId, u64>,

    listeners: Vec<Arc<dyn SoundEventListener>>,

    /// Locations already warned about since the last reload
    warned: HashSet<ResourceLocation>,

    /// Sounds warmed into the buffer cache whenever the engine loads
    preload_requests: Vec<Sound>,

    device_monitor: DeviceMonitor,
    listener: ListenerTransform,

    /// Decode workers and attach continuations; dropped last
    runtime: Runtime,
}

impl SoundEngine {
    /// Build the engine and open the output device.
    ///
    /// Only infrastructure failures (invalid config, runtime or command
    /// thread creation) are errors. A device that cannot be opened leaves
    /// the engine unloaded.
    pub fn new(
        config: EngineConfig,
        backend: Arc<dyn AudioBackend>,
        provider: Arc<dyn ResourceProvider>,
        registry: SoundRegistry,
    ) -> Result<Self> {
        config.validate()?;

        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .max_blocking_threads(config.decode_threads)
            .thread_name("chirp-worker")
            .enable_all()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build runtime: {}", e)))?;

        let channel_access = ChannelAccess::new(Arc::clone(&backend))?;
        let library =
            SoundBufferLibrary::new(provider, Arc::clone(&backend), runtime.handle().clone());
        let preload_requests = registry.preload_sounds();
        let device_monitor = DeviceMonitor::new(config.device_check_interval());

        let mut engine = Self {
            config,
            backend,
            registry,
            channel_access,
            library,
            loaded: false,
            tick_count: 0,
            sounds: SoundArena::new(),
            by_source: HashMap::new(),
            tickables: Vec::new(),
            queued_tickables: Vec::new(),
            delayed: HashMap::new(),
            listeners: Vec::new(),
            warned: HashSet::new(),
            preload_requests,
            device_monitor,
            listener: ListenerTransform::default(),
            runtime,
        };
        engine.load();
        Ok(engine)
    }

    fn load(&mut self) {
        if self.loaded {
            return;
        }

        let limits = PoolLimits {
            static_channels: self.config.static_channels,
            streaming_channels: self.config.streaming_channels,
        };

        match self.backend.open(self.config.preferred_device(), limits) {
            Ok(()) => {
                let backend = Arc::clone(&self.backend);
                let transform = self.listener;
                self.channel_access
                    .submit(Box::new(move || backend.set_listener(&transform)));

                if !self.preload_requests.is_empty() {
                    self.library.preload(&self.preload_requests);
                }

                self.device_monitor.reset();
                self.loaded = true;
                info!("Sound engine started");
            }
            Err(e) => {
                error!("Error starting sound system, turning off sounds and music: {}", e);
            }
        }
    }

    /// Tear down and reopen the output device.
    pub fn reload(&mut self) {
        self.warned.clear();
        self.destroy();
        self.load();
    }

    /// Release every channel and cached buffer and close the device.
    pub fn destroy(&mut self) {
        if self.loaded {
            self.stop_all();
            self.library.clear();
            self.backend.close();
            self.loaded = false;
            info!("Sound engine stopped");
        }
    }

    /// Stop using the device immediately, without waiting for queued work.
    pub fn emergency_shutdown(&mut self) {
        warn!("Emergency sound engine shutdown");
        self.loaded = false;
        self.channel_access.stop_thread();
        self.channel_access.clear();
        self.clear_registry();
        self.library.clear();
        self.backend.close();
        if let Err(e) = self.channel_access.restart_thread() {
            error!("Failed to restart command thread: {}", e);
        }
    }

    /// Stop every sound: discard queued commands, release every channel and
    /// forget all registered sounds.
    pub fn stop_all(&mut self) {
        if !self.loaded {
            return;
        }

        self.channel_access.stop_thread();
        self.channel_access.clear();
        self.clear_registry();

        if let Err(e) = self.channel_access.restart_thread() {
            error!("Failed to restart command thread: {}", e);
        }
    }

    fn clear_registry(&mut self) {
        self.sounds.clear();
        self.by_source.clear();
        self.tickables.clear();
        self.queued_tickables.clear();
        self.delayed.clear();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SoundRegistry {
        &self.registry
    }

    /// Install a new registry and reload so stale buffers are dropped.
    pub fn set_registry(&mut self, registry: SoundRegistry) {
        for sound in registry.preload_sounds() {
            self.add_preload_request(sound);
        }
        self.registry = registry;
        self.reload();
    }

    /// Number of sounds currently holding a channel
    pub fn active_count(&self) -> usize {
        self.sounds.active_count()
    }

    // ========================================================================
    // Playback
    // ========================================================================

    /// Try to start `instance` now.
    pub fn play(&mut self, instance: Arc<dyn SoundInstance>) -> PlayResult {
        if !self.loaded {
            return PlayResult::NotStarted;
        }
        let id = self.sounds.reserve(instance);
        self.start(id)
    }

    /// Start `instance` after `delay` ticks.
    pub fn play_delayed(&mut self, instance: Arc<dyn SoundInstance>, delay: u64) -> SoundId {
        let id = self.sounds.reserve(instance);
        self.delayed.insert(id, self.tick_count.saturating_add(delay));
        id
    }

    /// Start a tickable sound on the next tick if it can play by then.
    pub fn queue_tickable(&mut self, instance: Arc<dyn SoundInstance>) -> SoundId {
        let id = self.sounds.reserve(instance);
        self.queued_tickables.push(id);
        id
    }

    /// Start a reserved sound; the id is forgotten if it does not start.
    fn start(&mut self, id: SoundId) -> PlayResult {
        let Some(instance) = self.sounds.instance(id).cloned() else {
            return PlayResult::NotStarted;
        };

        let result = self.try_start(id, &instance);
        if result == PlayResult::NotStarted {
            self.sounds.remove(id);
        }
        result
    }

    fn try_start(&mut self, id: SoundId, instance: &Arc<dyn SoundInstance>) -> PlayResult {
        if !self.loaded || !instance.can_play_sound() {
            return PlayResult::NotStarted;
        }

        let event = instance.location();
        let Some(events) = self.registry.get(event) else {
            warn_once(&mut self.warned, event, "Unable to play unknown sound event");
            return PlayResult::NotStarted;
        };

        let sound = events.pick(&self.registry, &mut rand::thread_rng());
        if sound.is_empty() {
            warn_once(&mut self.warned, event, "Unable to play empty sound event");
            return PlayResult::NotStarted;
        }

        let volume = self.calculate_volume(instance.as_ref(), &sound);
        let pitch = self.calculate_pitch(instance.as_ref(), &sound);
        let attenuation = instance.attenuation();
        let relative = instance.is_relative();
        let attenuation_distance = instance.volume().max(1.0) * sound.attenuation_distance() as f32;

        if !self.listeners.is_empty() {
            let range = if !relative && attenuation != Attenuation::None {
                attenuation_distance
            } else {
                f32::INFINITY
            };
            for listener in &self.listeners {
                listener.on_play_sound(instance.as_ref(), events, range);
            }
        }

        if sound.is_intentionally_empty() {
            return PlayResult::NotStarted;
        }

        let mut silent = false;
        if volume <= 0.0 {
            if !instance.can_start_silent()
                && instance.source() != SoundSource::Music
                && !self.config.debug.play_silent_sounds
            {
                debug!("Skipped playing sound {}, volume was zero", sound.location());
                return PlayResult::NotStarted;
            }
            silent = true;
        }

        let auto_loop = should_loop_automatically(instance.as_ref());
        let stream = sound.should_stream();
        let kind = if stream {
            PoolKind::Streaming
        } else {
            PoolKind::Static
        };

        let handle = match self
            .channel_access
            .create_handle(kind)
            .wait(self.config.acquire_timeout())
        {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                if self.config.debug.log_exhaustion {
                    warn!("Failed to create new sound handle: {:?} pool exhausted", kind);
                } else {
                    trace!("{:?} pool exhausted", kind);
                }
                return PlayResult::NotStarted;
            }
            Err(e) => {
                warn!("Failed to acquire channel for {}: {}", event, e);
                return PlayResult::NotStarted;
            }
        };

        debug!("Playing sound {} for event {}", sound.location(), event);

        let position = instance.position();
        handle.execute(move |channel| {
            channel.set_pitch(pitch);
            channel.set_volume(volume);
            if attenuation == Attenuation::Linear {
                channel.linear_attenuation(attenuation_distance);
            } else {
                channel.disable_attenuation();
            }
            channel.set_looping(auto_loop && !stream);
            channel.set_position(position);
            channel.set_relative(relative);
        });

        let path = sound.path();
        if stream {
            let task = self.library.get_stream(&path, auto_loop);
            let handle = handle.clone();
            self.runtime.spawn(async move {
                match task.await {
                    Ok(Ok(stream)) => handle.execute(move |channel| {
                        // Stopped while the stream was opening
                        if channel.stopped() {
                            return;
                        }
                        channel.attach_stream(stream);
                        channel.play();
                    }),
                    Ok(Err(e)) => {
                        warn!("Failed to open stream {}: {}", path, e);
                        handle.execute(Channel::stop);
                    }
                    Err(e) => {
                        error!("Stream worker for {} failed: {}", path, e);
                        handle.execute(Channel::stop);
                    }
                }
            });
        } else {
            let buffer = self.library.get_complete_buffer(&path);
            let handle = handle.clone();
            self.runtime.spawn(async move {
                match buffer.await {
                    Ok(buffer) => handle.execute(move |channel| {
                        if channel.stopped() {
                            return;
                        }
                        channel.attach_static_buffer(&buffer);
                        channel.play();
                    }),
                    Err(e) => {
                        warn!("Failed to load sound {}: {}", path, e);
                        handle.execute(Channel::stop);
                    }
                }
            });
        }

        let source = instance.source();
        self.sounds.activate(
            id,
            ActiveSound {
                instance: Arc::clone(instance),
                sound,
                source,
                handle,
                remove_after_tick: self.tick_count.saturating_add(self.config.removal_grace_ticks),
                stop_requested: false,
            },
        );
        self.by_source.entry(source).or_default().push(id);
        if instance.as_tickable().is_some() {
            self.tickables.push(id);
        }

        if silent {
            PlayResult::StartedSilently(id)
        } else {
            PlayResult::Started(id)
        }
    }

    /// Stop one sound. Unknown or already stopped ids are ignored.
    ///
    /// An active sound stays registered until the next tick notices its
    /// channel has stopped. A sound that has not started yet is cancelled.
    pub fn stop(&mut self, id: SoundId) {
        if !self.loaded {
            return;
        }

        if let Some(active) = self.sounds.get_mut(id) {
            active.stop_requested = true;
            active.handle.execute(Channel::stop);
        } else if self.sounds.is_reserved(id) {
            self.delayed.remove(&id);
            self.queued_tickables.retain(|queued| *queued != id);
            self.sounds.remove(id);
        }
    }

    /// Stop sounds by event and/or category.
    ///
    /// With neither filter this is `stop_all`. With a category, only that
    /// category's sounds (optionally matching `event`) stop. With only an
    /// event, every active sound for it stops.
    pub fn stop_by(&mut self, event: Option<&ResourceLocation>, source: Option<SoundSource>) {
        let wanted = |instance: &dyn SoundInstance| event.map_or(true, |e| instance.location() == e);

        let ids: Vec<SoundId> = match (event, source) {
            (None, None) => {
                self.stop_all();
                return;
            }
            (_, Some(source)) => self
                .by_source
                .get(&source)
                .into_iter()
                .flatten()
                .copied()
                .filter(|id| {
                    self.sounds
                        .get(*id)
                        .is_some_and(|active| wanted(active.instance.as_ref()))
                })
                .collect(),
            (Some(_), None) => self
                .sounds
                .iter_active()
                .filter(|(_, active)| wanted(active.instance.as_ref()))
                .map(|(id, _)| id)
                .collect(),
        };

        for id in ids {
            self.stop(id);
        }
    }

    /// True while the sound holds a channel, including the grace window after
    /// its channel stopped.
    pub fn is_active(&self, id: SoundId) -> bool {
        self.loaded && self.sounds.get(id).is_some()
    }

    // ========================================================================
    // Tick
    // ========================================================================

    /// Advance one simulation tick.
    ///
    /// While paused only finished music is reaped; everything else is frozen.
    pub fn tick(&mut self, paused: bool) {
        if !self.loaded {
            return;
        }

        if self.device_monitor.should_change_device(
            &self.backend,
            self.config.preferred_device(),
            self.runtime.handle(),
        ) {
            info!("Output device changed, reloading sound engine");
            self.reload();
            if !self.loaded {
                return;
            }
        }

        if paused {
            self.tick_in_pause();
        } else {
            self.tick_non_paused();
        }

        self.channel_access.schedule_tick();
    }

    fn tick_non_paused(&mut self) {
        self.tick_count += 1;

        for id in std::mem::take(&mut self.queued_tickables) {
            let can_play = self
                .sounds
                .instance(id)
                .is_some_and(|instance| instance.can_play_sound());
            if can_play {
                self.start(id);
            } else {
                self.sounds.remove(id);
            }
        }

        self.tick_sounds();
        self.reap_stopped();
        self.fire_delayed();
    }

    fn tick_sounds(&mut self) {
        for id in self.tickables.clone() {
            let Some(instance) = self.sounds.get(id).map(|a| Arc::clone(&a.instance)) else {
                continue;
            };

            if !instance.can_play_sound() {
                self.stop(id);
                continue;
            }

            let Some(tickable) = instance.as_tickable() else {
                continue;
            };
            tickable.tick();

            if tickable.is_stopped() {
                self.stop(id);
                continue;
            }

            if let Some(active) = self.sounds.get(id) {
                let volume = self.calculate_volume(instance.as_ref(), &active.sound);
                let pitch = self.calculate_pitch(instance.as_ref(), &active.sound);
                let position = instance.position();
                active.handle.execute(move |channel| {
                    channel.set_volume(volume);
                    channel.set_pitch(pitch);
                    channel.set_position(position);
                });
            }
        }
    }

    fn reap_stopped(&mut self) {
        for id in self.sounds.active_ids() {
            let Some(active) = self.sounds.get(id) else {
                continue;
            };

            if self.config.category_volume(active.source) <= 0.0 {
                active.handle.execute(Channel::stop);
                self.forget(id);
                continue;
            }

            if !active.handle.is_stopped() || active.remove_after_tick > self.tick_count {
                continue;
            }

            debug!(
                "Removed channel {:?} because it's not playing anymore",
                active.handle
            );

            if !active.stop_requested && should_loop_manually(active.instance.as_ref()) {
                let restart_at = self.tick_count.saturating_add(active.instance.delay());
                self.detach(id);
                self.delayed.insert(id, restart_at);
            } else {
                self.forget(id);
            }
        }
    }

    fn fire_delayed(&mut self) {
        let mut due: Vec<SoundId> = self
            .delayed
            .iter()
            .filter(|(_, at)| self.tick_count >= **at)
            .map(|(id, _)| *id)
            .collect();
        due.sort();

        for id in due {
            self.delayed.remove(&id);
            if let Some(tickable) = self.sounds.instance(id).and_then(|i| i.as_tickable()) {
                tickable.tick();
            }
            self.start(id);
        }
    }

    fn tick_in_pause(&mut self) {
        let finished_music: Vec<SoundId> = self
            .sounds
            .iter_active()
            .filter(|(_, active)| active.source == SoundSource::Music && active.handle.is_stopped())
            .map(|(id, _)| id)
            .collect();

        for id in finished_music {
            self.forget(id);
        }
    }

    /// Remove the channel state of `id` but keep the id reserved.
    fn detach(&mut self, id: SoundId) {
        if let Some(active) = self.sounds.deactivate(id) {
            self.untrack(id, active.source);
        }
    }

    /// Remove every trace of `id`.
    fn forget(&mut self, id: SoundId) {
        if let Some(active) = self.sounds.remove(id) {
            self.untrack(id, active.source);
        }
        self.delayed.remove(&id);
    }

    fn untrack(&mut self, id: SoundId, source: SoundSource) {
        if let Some(ids) = self.by_source.get_mut(&source) {
            ids.retain(|other| *other != id);
        }
        self.tickables.retain(|other| *other != id);
    }

    // ========================================================================
    // Volume
    // ========================================================================

    fn category_gain(&self, source: SoundSource) -> f32 {
        let master = self.config.category_volume(SoundSource::Master).clamp(0.0, 1.0);
        if source == SoundSource::Master {
            master
        } else {
            self.config.category_volume(source).clamp(0.0, 1.0) * master
        }
    }

    fn calculate_volume(&self, instance: &dyn SoundInstance, sound: &Sound) -> f32 {
        (instance.volume() * sound.volume()).clamp(0.0, 1.0) * self.category_gain(instance.source())
    }

    fn calculate_pitch(&self, instance: &dyn SoundInstance, sound: &Sound) -> f32 {
        (instance.pitch() * sound.pitch()).clamp(MIN_PITCH, MAX_PITCH)
    }

    /// Push recomputed volume to every sound in `source` (all sounds for the
    /// master category). Channels whose volume drops to zero are stopped.
    pub fn refresh_category_volume(&mut self, source: SoundSource) {
        if !self.loaded {
            return;
        }

        for (_, active) in self.sounds.iter_active() {
            if source != SoundSource::Master && active.source != source {
                continue;
            }
            let volume = self.calculate_volume(active.instance.as_ref(), &active.sound);
            active.handle.execute(move |channel| {
                if volume <= 0.0 {
                    channel.stop();
                } else {
                    channel.set_volume(volume);
                }
            });
        }
    }

    /// Change a category's gain at runtime. Invalid gains leave the current
    /// volume untouched.
    pub fn update_category_volume(&mut self, source: SoundSource, gain: f32) -> Result<()> {
        self.config.set_category_volume(source, gain)?;
        self.refresh_category_volume(source);
        Ok(())
    }

    // ========================================================================
    // Pause / resume
    // ========================================================================

    /// Pause every channel whose category is not in `keep`.
    pub fn pause_all_except(&mut self, keep: &[SoundSource]) {
        if !self.loaded {
            return;
        }
        for (_, active) in self.sounds.iter_active() {
            if !keep.contains(&active.source) {
                active.handle.execute(Channel::pause);
            }
        }
    }

    pub fn resume(&mut self) {
        if self.loaded {
            self.channel_access.execute_on_channels(Channel::resume);
        }
    }

    // ========================================================================
    // Listener, observers, preload, diagnostics
    // ========================================================================

    pub fn set_listener(&mut self, transform: ListenerTransform) {
        self.listener = transform;
        if self.loaded {
            let backend = Arc::clone(&self.backend);
            self.channel_access
                .submit(Box::new(move || backend.set_listener(&transform)));
        }
    }

    pub fn listener_transform(&self) -> ListenerTransform {
        self.listener
    }

    pub fn add_listener(&mut self, listener: Arc<dyn SoundEventListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_listener(&mut self, listener: &Arc<dyn SoundEventListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .retain(|l| Arc::as_ptr(l) as *const () != target);
    }

    fn add_preload_request(&mut self, sound: Sound) {
        if !self
            .preload_requests
            .iter()
            .any(|s| s.location() == sound.location())
        {
            self.preload_requests.push(sound);
        }
    }

    /// Keep `sound` warm in the buffer cache, now and after every reload.
    pub fn request_preload(&mut self, sound: Sound) {
        if self.loaded {
            self.library.preload(std::slice::from_ref(&sound));
        }
        self.add_preload_request(sound);
    }

    pub fn available_devices(&self) -> Vec<String> {
        self.backend.available_devices()
    }

    pub fn current_device(&self) -> Option<String> {
        self.backend.current_device_name()
    }

    /// Channel pool occupancy, e.g. `Sounds: 3/247 + 1/8`
    pub fn debug_string(&self) -> String {
        let usage = self.backend.pool_usage();
        format!(
            "Sounds: {}/{} + {}/{}",
            usage.static_used, usage.static_max, usage.streaming_used, usage.streaming_max
        )
    }
}

impl Drop for SoundEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}
