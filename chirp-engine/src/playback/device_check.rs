//! Output device change detection
//!
//! A cheap disconnect check runs every tick. The expensive probe (device
//! enumeration) runs at most once per interval on a blocking worker, and an
//! atomic three-state flag keeps more than one probe from ever being in
//! flight.

use crate::backend::AudioBackend;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{info, trace};

const NO_CHANGE: u8 = 0;
const ONGOING: u8 = 1;
const CHANGE_DETECTED: u8 = 2;

/// Device probe state shared with the background probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCheckState {
    NoChange,
    Ongoing,
    ChangeDetected,
}

impl DeviceCheckState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ONGOING => Self::Ongoing,
            CHANGE_DETECTED => Self::ChangeDetected,
            _ => Self::NoChange,
        }
    }
}

pub(crate) struct DeviceMonitor {
    state: Arc<AtomicU8>,
    interval: Duration,
    last_check: Option<Instant>,
}

impl DeviceMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU8::new(NO_CHANGE)),
            interval,
            last_check: None,
        }
    }

    pub fn state(&self) -> DeviceCheckState {
        DeviceCheckState::from_raw(self.state.load(Ordering::Acquire))
    }

    /// Forget a pending result, e.g. after a reload.
    ///
    /// A probe still in flight keeps its `Ongoing` claim so no second probe
    /// can start until it finishes.
    pub fn reset(&mut self) {
        let _ = self.state.compare_exchange(
            CHANGE_DETECTED,
            NO_CHANGE,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.last_check = Some(Instant::now());
    }

    /// True when the engine should reload its output device.
    ///
    /// `preferred` is the configured device name, `None` when following the
    /// system default.
    pub fn should_change_device(
        &mut self,
        backend: &Arc<dyn AudioBackend>,
        preferred: Option<&str>,
        runtime: &Handle,
    ) -> bool {
        if backend.is_current_device_disconnected() {
            info!("Audio device was lost");
            return true;
        }

        let now = Instant::now();
        let due = self
            .last_check
            .map_or(true, |last| now.duration_since(last) >= self.interval);

        if due {
            self.last_check = Some(now);
            if self
                .state
                .compare_exchange(NO_CHANGE, ONGOING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let state = Arc::clone(&self.state);
                let backend = Arc::clone(backend);
                let preferred = preferred.map(str::to_string);
                runtime.spawn_blocking(move || probe(backend.as_ref(), preferred.as_deref(), &state));
            }
        }

        self.state
            .compare_exchange(CHANGE_DETECTED, NO_CHANGE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn probe(backend: &dyn AudioBackend, preferred: Option<&str>, state: &AtomicU8) {
    trace!("Probing output devices");
    let changed = match preferred {
        None => {
            let changed = backend.has_default_device_changed();
            if changed {
                info!("System default audio device has changed");
            }
            changed
        }
        Some(name) => {
            let current = backend.current_device_name();
            let available = current.as_deref() != Some(name)
                && backend.available_devices().iter().any(|d| d == name);
            if available {
                info!("Preferred audio device '{}' has become available", name);
            }
            available
        }
    };

    if changed {
        let _ = state.compare_exchange(ONGOING, CHANGE_DETECTED, Ordering::AcqRel, Ordering::Acquire);
    }
    let _ = state.compare_exchange(ONGOING, NO_CHANGE, Ordering::AcqRel, Ordering::Acquire);
}
