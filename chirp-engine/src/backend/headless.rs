//! Headless backend
//!
//! Simulates a hardware mixer with bounded voice pools and wall-clock
//! playback timing, without producing any sound. Device names come from
//! cpal so device-change detection behaves as it would with real output.

use super::{
    AudioBackend, BufferId, ListenerTransform, PoolKind, PoolLimits, PoolUsage, Voice, VoiceState,
};
use crate::audio::devices;
use crate::audio::PcmData;
use crate::error::{Error, Result};
use chirp_common::Vec3;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Device name reported when cpal exposes no output device
const FALLBACK_DEVICE_NAME: &str = "Headless Output";

#[derive(Debug, Default)]
struct DeviceState {
    open: bool,
    limits: Option<PoolLimits>,
    static_used: usize,
    streaming_used: usize,

    /// Name of the opened device
    device_name: Option<String>,

    /// System default at open time, when following the default
    default_at_open: Option<String>,

    /// Device explicitly requested by configuration
    requested: Option<String>,

    buffers: HashMap<BufferId, Duration>,
    next_buffer_id: u64,
    listener: ListenerTransform,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<DeviceState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated mixer
#[derive(Debug, Default, Clone)]
pub struct HeadlessBackend {
    shared: Arc<Shared>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listener(&self) -> ListenerTransform {
        self.shared.lock().listener
    }
}

impl AudioBackend for HeadlessBackend {
    fn open(&self, device: Option<&str>, limits: PoolLimits) -> Result<()> {
        let available = devices::list_output_devices().unwrap_or_else(|e| {
            warn!("Device enumeration failed: {}", e);
            Vec::new()
        });
        let default_name = devices::default_output_device_name();

        let device_name = match device {
            Some(name) if available.iter().any(|d| d == name) => name.to_string(),
            Some(name) => {
                warn!(
                    "Requested device '{}' not available, falling back to default",
                    name
                );
                default_name
                    .clone()
                    .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_string())
            }
            None => default_name
                .clone()
                .unwrap_or_else(|| FALLBACK_DEVICE_NAME.to_string()),
        };

        if limits.static_channels + limits.streaming_channels == 0 {
            return Err(Error::Device("No voices requested".to_string()));
        }

        let mut state = self.shared.lock();
        state.open = true;
        state.limits = Some(limits);
        state.static_used = 0;
        state.streaming_used = 0;
        state.requested = device.map(str::to_string);
        state.default_at_open = default_name;
        state.device_name = Some(device_name.clone());

        info!(
            "Opened headless output on '{}' ({} static + {} streaming voices)",
            device_name, limits.static_channels, limits.streaming_channels
        );
        Ok(())
    }

    fn close(&self) {
        let mut state = self.shared.lock();
        if state.open {
            debug!("Closing headless output");
        }
        state.open = false;
        state.buffers.clear();
        state.static_used = 0;
        state.streaming_used = 0;
    }

    fn acquire_voice(&self, kind: PoolKind) -> Option<Box<dyn Voice>> {
        let mut state = self.shared.lock();
        let limits = state.limits.filter(|_| state.open)?;
        match kind {
            PoolKind::Static if state.static_used < limits.static_channels => {
                state.static_used += 1;
            }
            PoolKind::Streaming if state.streaming_used < limits.streaming_channels => {
                state.streaming_used += 1;
            }
            _ => return None,
        }
        drop(state);

        Some(Box::new(HeadlessVoice::new(kind, Arc::clone(&self.shared))))
    }

    fn release_voice(&self, voice: Box<dyn Voice>) {
        // The voice reports its pool back through `Drop`
        drop(voice);
    }

    fn upload_buffer(&self, pcm: &PcmData) -> Result<BufferId> {
        let mut state = self.shared.lock();
        if !state.open {
            return Err(Error::Device("Output device is not open".to_string()));
        }
        state.next_buffer_id += 1;
        let id = BufferId(state.next_buffer_id);
        state.buffers.insert(id, pcm.duration());
        Ok(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        self.shared.lock().buffers.remove(&buffer);
    }

    fn is_current_device_disconnected(&self) -> bool {
        // Nothing can unplug a simulated device
        false
    }

    fn has_default_device_changed(&self) -> bool {
        let (requested, at_open) = {
            let state = self.shared.lock();
            (state.requested.clone(), state.default_at_open.clone())
        };
        requested.is_none() && devices::default_output_device_name() != at_open
    }

    fn current_device_name(&self) -> Option<String> {
        self.shared.lock().device_name.clone()
    }

    fn available_devices(&self) -> Vec<String> {
        devices::list_output_devices().unwrap_or_else(|e| {
            warn!("Device enumeration failed: {}", e);
            Vec::new()
        })
    }

    fn set_listener(&self, transform: &ListenerTransform) {
        self.shared.lock().listener = *transform;
    }

    fn pool_usage(&self) -> PoolUsage {
        let state = self.shared.lock();
        let limits = state.limits.unwrap_or(PoolLimits {
            static_channels: 0,
            streaming_channels: 0,
        });
        PoolUsage {
            static_used: state.static_used,
            static_max: limits.static_channels,
            streaming_used: state.streaming_used,
            streaming_max: limits.streaming_channels,
        }
    }
}

/// Simulated voice: plays at nominal rate against the wall clock.
struct HeadlessVoice {
    kind: PoolKind,
    shared: Arc<Shared>,
    looping: bool,
    attached: Option<Duration>,
    queue: VecDeque<Duration>,

    /// Audio consumed by buffers already unqueued
    consumed: Duration,

    /// Playback time accumulated before the current run
    played: Duration,
    running_since: Option<Instant>,
    state: VoiceState,
}

impl HeadlessVoice {
    fn new(kind: PoolKind, shared: Arc<Shared>) -> Self {
        Self {
            kind,
            shared,
            looping: false,
            attached: None,
            queue: VecDeque::new(),
            consumed: Duration::ZERO,
            played: Duration::ZERO,
            running_since: None,
            state: VoiceState::Initial,
        }
    }

    fn position(&self) -> Duration {
        self.played + self.running_since.map(|t| t.elapsed()).unwrap_or_default()
    }

    fn has_run_out(&self) -> bool {
        let position = self.position();
        match self.kind {
            PoolKind::Static => match self.attached {
                Some(length) => !self.looping && position >= length,
                None => true,
            },
            PoolKind::Streaming => {
                let queued: Duration = self.queue.iter().sum();
                position >= self.consumed + queued
            }
        }
    }
}

impl Voice for HeadlessVoice {
    fn set_volume(&mut self, _volume: f32) {}

    fn set_pitch(&mut self, _pitch: f32) {}

    fn set_position(&mut self, _position: Vec3) {}

    fn set_relative(&mut self, _relative: bool) {}

    fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    fn linear_attenuation(&mut self, _distance: f32) {}

    fn disable_attenuation(&mut self) {}

    fn attach_buffer(&mut self, buffer: BufferId) {
        self.attached = self.shared.lock().buffers.get(&buffer).copied();
    }

    fn queue_buffer(&mut self, pcm: PcmData) {
        self.queue.push_back(pcm.duration());
    }

    fn unqueue_processed(&mut self) -> usize {
        let position = self.position();
        let mut processed = 0;
        while let Some(&front) = self.queue.front() {
            if self.consumed + front > position {
                break;
            }
            self.consumed += front;
            self.queue.pop_front();
            processed += 1;
        }
        processed
    }

    fn play(&mut self) {
        self.played = Duration::ZERO;
        self.consumed = Duration::ZERO;
        self.running_since = Some(Instant::now());
        self.state = VoiceState::Playing;
    }

    fn pause(&mut self) {
        if self.state() == VoiceState::Playing {
            self.played = self.position();
            self.running_since = None;
            self.state = VoiceState::Paused;
        }
    }

    fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.running_since = Some(Instant::now());
            self.state = VoiceState::Playing;
        }
    }

    fn stop(&mut self) {
        if self.state != VoiceState::Stopped {
            self.played = self.position();
            self.running_since = None;
            self.state = VoiceState::Stopped;
        }
    }

    fn state(&self) -> VoiceState {
        match self.state {
            VoiceState::Playing if self.has_run_out() => VoiceState::Stopped,
            state => state,
        }
    }
}

impl Drop for HeadlessVoice {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        match self.kind {
            PoolKind::Static => state.static_used = state.static_used.saturating_sub(1),
            PoolKind::Streaming => {
                state.streaming_used = state.streaming_used.saturating_sub(1)
            }
        }
    }
}
