//! Test helper modules for chirp-engine integration tests
//!
//! Provides reusable test infrastructure components:
//! - CountingBackend: in-memory voice pools that count every acquire/release
//! - MemoryProvider: resources served from memory with per-location open counts
//! - audio_generator: float WAV fixtures with known sample values

#![allow(dead_code)]

pub mod audio_generator;
pub mod counting_backend;
pub mod memory_provider;

pub use audio_generator::{float_wav, sine_wav, TEST_SAMPLE_RATE};
pub use counting_backend::{BackendCounters, CountingBackend};
pub use memory_provider::MemoryProvider;

use std::time::{Duration, Instant};

/// Poll `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
