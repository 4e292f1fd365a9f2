//! Mock audio backend that counts every voice it hands out
//!
//! Voices play until told to stop unless `finish_immediately` is set, in
//! which case `play` ends the sound at once (a zero-length clip).

use chirp_common::Vec3;
use chirp_engine::audio::PcmData;
use chirp_engine::backend::{
    AudioBackend, BufferId, ListenerTransform, PoolKind, PoolLimits, PoolUsage, Voice, VoiceState,
};
use chirp_engine::error::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct BackendCounters {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub acquire_attempts: AtomicUsize,
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub uploads: AtomicUsize,
    pub deletes: AtomicUsize,
    pub queued_buffers: AtomicUsize,
    pub listener_updates: AtomicUsize,
    pub plays: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
    static_used: AtomicUsize,
    streaming_used: AtomicUsize,
}

impl BackendCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        Self::get(&self.opens)
    }

    pub fn closes(&self) -> usize {
        Self::get(&self.closes)
    }

    pub fn acquired(&self) -> usize {
        Self::get(&self.acquired)
    }

    pub fn released(&self) -> usize {
        Self::get(&self.released)
    }

    pub fn in_use(&self) -> usize {
        Self::get(&self.static_used) + Self::get(&self.streaming_used)
    }

    fn used(&self, kind: PoolKind) -> &AtomicUsize {
        match kind {
            PoolKind::Static => &self.static_used,
            PoolKind::Streaming => &self.streaming_used,
        }
    }
}

#[derive(Default)]
pub struct CountingBackend {
    counters: Arc<BackendCounters>,
    limits: Mutex<Option<PoolLimits>>,
    next_buffer: AtomicU64,

    /// Reported once by `has_default_device_changed`
    default_changed: AtomicBool,
    disconnected: AtomicBool,
    fail_open: AtomicBool,
    finish_immediately: AtomicBool,
}

impl CountingBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn finishing_immediately() -> Arc<Self> {
        let backend = Self::default();
        backend.finish_immediately.store(true, Ordering::SeqCst);
        Arc::new(backend)
    }

    pub fn counters(&self) -> &BackendCounters {
        &self.counters
    }

    /// Make the next expensive device probe report a new system default.
    pub fn change_default_device(&self) {
        self.default_changed.store(true, Ordering::SeqCst);
    }

    pub fn set_disconnected(&self, disconnected: bool) {
        self.disconnected.store(disconnected, Ordering::SeqCst);
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }
}

impl AudioBackend for CountingBackend {
    fn open(&self, _device: Option<&str>, limits: PoolLimits) -> Result<()> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Device("No output device".to_string()));
        }
        self.disconnected.store(false, Ordering::SeqCst);
        *self.limits.lock().unwrap() = Some(limits);
        Ok(())
    }

    fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        *self.limits.lock().unwrap() = None;
    }

    fn acquire_voice(&self, kind: PoolKind) -> Option<Box<dyn Voice>> {
        self.counters.acquire_attempts.fetch_add(1, Ordering::SeqCst);
        let limits = (*self.limits.lock().unwrap())?;
        let max = match kind {
            PoolKind::Static => limits.static_channels,
            PoolKind::Streaming => limits.streaming_channels,
        };

        let used = self.counters.used(kind);
        if used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_err()
        {
            return None;
        }

        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(CountingVoice {
            kind,
            counters: Arc::clone(&self.counters),
            state: VoiceState::Initial,
            queued: 0,
            finish_immediately: self.finish_immediately.load(Ordering::SeqCst),
        }))
    }

    fn release_voice(&self, voice: Box<dyn Voice>) {
        self.counters.released.fetch_add(1, Ordering::SeqCst);
        drop(voice);
    }

    fn upload_buffer(&self, _pcm: &PcmData) -> Result<BufferId> {
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(BufferId(self.next_buffer.fetch_add(1, Ordering::SeqCst)))
    }

    fn delete_buffer(&self, _buffer: BufferId) {
        self.counters.deletes.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current_device_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn has_default_device_changed(&self) -> bool {
        self.default_changed.swap(false, Ordering::SeqCst)
    }

    fn current_device_name(&self) -> Option<String> {
        Some("Counting Output".to_string())
    }

    fn available_devices(&self) -> Vec<String> {
        vec!["Counting Output".to_string()]
    }

    fn set_listener(&self, _transform: &ListenerTransform) {
        self.counters.listener_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn pool_usage(&self) -> PoolUsage {
        let limits = (*self.limits.lock().unwrap()).unwrap_or(PoolLimits {
            static_channels: 0,
            streaming_channels: 0,
        });
        PoolUsage {
            static_used: BackendCounters::get(&self.counters.static_used),
            static_max: limits.static_channels,
            streaming_used: BackendCounters::get(&self.counters.streaming_used),
            streaming_max: limits.streaming_channels,
        }
    }
}

struct CountingVoice {
    kind: PoolKind,
    counters: Arc<BackendCounters>,
    state: VoiceState,
    queued: usize,
    finish_immediately: bool,
}

impl Voice for CountingVoice {
    fn set_volume(&mut self, _volume: f32) {}
    fn set_pitch(&mut self, _pitch: f32) {}
    fn set_position(&mut self, _position: Vec3) {}
    fn set_relative(&mut self, _relative: bool) {}
    fn set_looping(&mut self, _looping: bool) {}
    fn linear_attenuation(&mut self, _distance: f32) {}
    fn disable_attenuation(&mut self) {}
    fn attach_buffer(&mut self, _buffer: BufferId) {}

    fn queue_buffer(&mut self, _pcm: PcmData) {
        self.queued += 1;
        self.counters.queued_buffers.fetch_add(1, Ordering::SeqCst);
    }

    fn unqueue_processed(&mut self) -> usize {
        if self.finish_immediately {
            std::mem::take(&mut self.queued)
        } else {
            0
        }
    }

    fn play(&mut self) {
        self.counters.plays.fetch_add(1, Ordering::SeqCst);
        self.state = if self.finish_immediately {
            VoiceState::Stopped
        } else {
            VoiceState::Playing
        };
    }

    fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.state = VoiceState::Paused;
            self.counters.pauses.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn resume(&mut self) {
        if self.state == VoiceState::Paused {
            self.state = VoiceState::Playing;
            self.counters.resumes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn stop(&mut self) {
        self.state = VoiceState::Stopped;
    }

    fn state(&self) -> VoiceState {
        self.state
    }
}

impl Drop for CountingVoice {
    fn drop(&mut self) {
        self.counters.used(self.kind).fetch_sub(1, Ordering::SeqCst);
    }
}
