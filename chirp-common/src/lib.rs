//! # Chirp Common Library
//!
//! Shared vocabulary for the chirp sound engine crates:
//! - Resource identifiers (`namespace:path`)
//! - Sound categories (buses) and their names
//! - Sound registration documents and the event registry
//! - Configuration file discovery
//! - Small math types shared with the listener/channel model

pub mod config;
pub mod error;
pub mod location;
pub mod math;
pub mod sounds;
pub mod source;

pub use error::{Error, Result};
pub use location::ResourceLocation;
pub use math::Vec3;
pub use sounds::{Sound, SoundKind, SoundRegistry, WeighedSoundEvents};
pub use source::SoundSource;
