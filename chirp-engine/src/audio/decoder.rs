//! Streaming audio decoder using symphonia
//!
//! Turns a compressed bitstream (Ogg Vorbis in practice; any format the
//! symphonia probe recognises) into interleaved signed 16-bit PCM, one packet
//! at a time, so playback can begin before the whole file is decoded.
//!
//! Framing is initialised once from the stream header when the decoder is
//! constructed. Corrupt framing or packet data fails fast with
//! [`Error::Decode`]; whatever was accumulated for the failed read is dropped.

use super::accumulator::ChunkAccumulator;
use super::types::{AudioFormat, AudioStream, PcmData};
use crate::error::{Error, Result};
use crate::resources::ReadSource;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Quantize a floating-point sample to signed 16-bit.
///
/// `round(x * 32767.5 - 0.5)` with round-half-up, after clamping `x` to
/// `[-1.0, 1.0]`; the result is clamped to the `i16` range. This exact rule
/// keeps output bit-compatible across decoder implementations.
pub fn quantize(sample: f32) -> i16 {
    let scaled = f64::from(sample.clamp(-1.0, 1.0)) * 32767.5 - 0.5;
    let rounded = (scaled + 0.5).floor();
    rounded.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Packet-at-a-time decoder over a single audio track.
pub struct StreamingDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: AudioFormat,

    /// Planar scratch buffer reused across packets
    scratch: Option<SampleBuffer<f32>>,
}

impl StreamingDecoder {
    /// Probe the stream header and prepare the codec.
    ///
    /// # Arguments
    /// - `source`: compressed byte source, read sequentially
    /// - `extension`: optional file extension used as a probe hint
    ///
    /// # Errors
    /// - Unrecognised container or malformed header
    /// - No decodable audio track, or missing sample rate / channel layout
    pub fn new(source: Box<dyn ReadSource>, extension: Option<&str>) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(source)), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .filter(|&c| c > 0)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(codec_params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!(
            "Opened audio stream: sample_rate={}, channels={}",
            sample_rate, channels
        );

        Ok(Self {
            reader,
            decoder,
            track_id,
            format: AudioFormat::new(sample_rate, channels),
            scratch: None,
        })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Decode the next packet, pushing every sample to `sink` in interleaved
    /// channel order.
    ///
    /// Returns `Ok(false)` once the bitstream is exhausted.
    pub fn read_chunk(&mut self, sink: &mut dyn FnMut(f32)) -> Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    trace!("Reached end of stream");
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    return Err(Error::Decode(
                        "Stream parameters changed mid-stream".to_string(),
                    ));
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to read packet: {}", e)));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self
                .decoder
                .decode(&packet)
                .map_err(|e| Error::Decode(format!("Failed to decode packet: {}", e)))?;

            let frames = decoded.frames();
            if frames == 0 {
                return Ok(true);
            }

            let channels = decoded.spec().channels.count();
            let required = decoded.capacity() * channels;
            if self
                .scratch
                .as_ref()
                .is_some_and(|buf| buf.capacity() < required)
            {
                self.scratch = None;
            }
            let (capacity, spec) = (decoded.capacity() as u64, *decoded.spec());
            let scratch = self
                .scratch
                .get_or_insert_with(|| SampleBuffer::<f32>::new(capacity, spec));
            scratch.copy_planar_ref(decoded);

            interleave_planar(scratch.samples(), channels, frames, sink);
            return Ok(true);
        }
    }

    /// Decode until at least `expected_size` bytes are produced or the
    /// stream ends.
    pub fn read(&mut self, expected_size: usize) -> Result<Vec<u8>> {
        let mut acc = ChunkAccumulator::default();
        while acc.byte_count() < expected_size && self.read_chunk(&mut |s| acc.put_sample(s))? {}
        Ok(acc.finish())
    }

    /// Decode the remainder of the stream.
    pub fn read_all(&mut self) -> Result<PcmData> {
        let mut acc = ChunkAccumulator::default();
        while self.read_chunk(&mut |s| acc.put_sample(s))? {}
        Ok(PcmData::new(self.format, acc.finish()))
    }
}

impl AudioStream for StreamingDecoder {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, expected_size: usize) -> Result<Vec<u8>> {
        StreamingDecoder::read(self, expected_size)
    }
}

/// Emit planar samples (`channels` runs of `frames` samples) interleaved.
fn interleave_planar(planar: &[f32], channels: usize, frames: usize, sink: &mut dyn FnMut(f32)) {
    match channels {
        1 => {
            for &sample in &planar[..frames] {
                sink(sample);
            }
        }
        2 => {
            let (left, right) = planar[..frames * 2].split_at(frames);
            for (&l, &r) in left.iter().zip(right) {
                sink(l);
                sink(r);
            }
        }
        _ => {
            for frame in 0..frames {
                for ch in 0..channels {
                    sink(planar[ch * frames + frame]);
                }
            }
        }
    }
}
