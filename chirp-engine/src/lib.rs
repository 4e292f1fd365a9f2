//! # Chirp Sound Engine Library (chirp-engine)
//!
//! Runtime audio engine for a tick-driven simulation.
//!
//! **Purpose:** Play, loop and stop sound effects and music while keeping the
//! simulation thread insulated from audio hardware latency.
//!
//! **Architecture:**
//! - `playback::engine`: the orchestrator the simulation thread talks to
//! - `playback::channel_access`: channel handles and the command thread that
//!   owns every hardware voice
//! - `playback::buffer_library`: memoized asynchronous decode of sound files
//! - `audio`: streaming symphonia decoder, chunk accumulator, looping wrapper
//! - `backend`: the hardware abstraction (voices, buffers, devices)

pub mod audio;
pub mod backend;
pub mod config;
pub mod error;
pub mod playback;
pub mod resources;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use playback::engine::{PlayResult, SoundEngine, SoundId};
