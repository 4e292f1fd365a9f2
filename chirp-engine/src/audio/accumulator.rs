//! Chunked sample accumulator
//!
//! Collects quantized samples into fixed-size segments so appending never
//! reallocates already-written data. `finish` concatenates the segments into
//! one buffer sized to exactly the bytes written.

use super::decoder::quantize;

/// Size of one accumulation segment in bytes
pub const CHUNK_SIZE: usize = 8192;

/// Growth-bounded PCM byte accumulator
#[derive(Debug)]
pub struct ChunkAccumulator {
    /// Completed segments, each exactly `chunk_size` bytes
    chunks: Vec<Vec<u8>>,

    /// Segment currently being filled
    current: Vec<u8>,

    chunk_size: usize,

    /// Total bytes written across all segments
    byte_count: usize,
}

impl Default for ChunkAccumulator {
    fn default() -> Self {
        Self::new(CHUNK_SIZE)
    }
}

impl ChunkAccumulator {
    /// `chunk_size` is rounded up to an even number so a sample never
    /// straddles two segments.
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = (chunk_size.max(2) + 1) & !1;
        Self {
            chunks: Vec::new(),
            current: Vec::with_capacity(chunk_size),
            chunk_size,
            byte_count: 0,
        }
    }

    /// Quantize a floating-point sample and append it.
    pub fn put_sample(&mut self, sample: f32) {
        self.put_i16(quantize(sample));
    }

    /// Append a signed 16-bit sample (little-endian).
    pub fn put_i16(&mut self, sample: i16) {
        if self.current.len() == self.chunk_size {
            let full = std::mem::replace(&mut self.current, Vec::with_capacity(self.chunk_size));
            self.chunks.push(full);
        }
        self.current.extend_from_slice(&sample.to_le_bytes());
        self.byte_count += 2;
    }

    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    pub fn is_empty(&self) -> bool {
        self.byte_count == 0
    }

    /// Concatenate all segments into a contiguous buffer.
    pub fn finish(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_count);
        for chunk in &self.chunks {
            out.extend_from_slice(chunk);
        }
        out.extend_from_slice(&self.current);
        out
    }
}
