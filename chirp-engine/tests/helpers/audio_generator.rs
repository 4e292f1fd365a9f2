//! Audio Test File Generation Utilities
//!
//! Generates 32-bit float WAV files in memory. Float samples survive the
//! container untouched, so decoder output can be compared bit-for-bit with
//! the quantization rule.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::f32::consts::PI;
use std::io::Cursor;

/// Standard test sample rate (8 kHz keeps fixtures small)
pub const TEST_SAMPLE_RATE: u32 = 8000;

/// Encode interleaved float samples as a WAV file.
pub fn float_wav(sample_rate: u32, channels: u16, interleaved: &[f32]) -> Vec<u8> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut bytes = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for sample in interleaved {
            writer.write_sample(*sample).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

/// Stereo sine wave (left and right in opposite phase) of `frames` frames.
pub fn sine_wav(frames: usize, frequency_hz: f32, amplitude: f32) -> Vec<u8> {
    let mut samples = Vec::with_capacity(frames * 2);
    for n in 0..frames {
        let t = n as f32 / TEST_SAMPLE_RATE as f32;
        let value = amplitude * (2.0 * PI * frequency_hz * t).sin();
        samples.push(value);
        samples.push(-value);
    }
    float_wav(TEST_SAMPLE_RATE, 2, &samples)
}
