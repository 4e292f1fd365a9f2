//! Audio decoding and PCM types

pub mod accumulator;
pub mod decoder;
pub mod devices;
pub mod looping;
pub mod types;

pub use accumulator::ChunkAccumulator;
pub use decoder::{quantize, StreamingDecoder};
pub use looping::LoopingAudioStream;
pub use types::{AudioFormat, AudioStream, PcmData, SoundBuffer};
