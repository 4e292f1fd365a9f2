//! Looping wrapper around the streaming decoder
//!
//! The compressed source is read exactly once. Every byte pulled from it is
//! recorded, so when a decoder reaches the end of the bitstream a fresh
//! decoder can be built over a cursor that replays the recording from the
//! start. This makes looping work on sources that cannot seek.

use super::decoder::StreamingDecoder;
use super::types::{AudioFormat, AudioStream};
use crate::error::Result;
use crate::resources::ReadSource;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

struct ReplayState {
    inner: Box<dyn ReadSource>,
    recorded: Vec<u8>,
    inner_done: bool,
}

/// Records an underlying source so it can be re-read from position zero.
#[derive(Clone)]
struct ReplayBuffer {
    state: Arc<Mutex<ReplayState>>,
}

impl ReplayBuffer {
    fn new(inner: Box<dyn ReadSource>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ReplayState {
                inner,
                recorded: Vec::new(),
                inner_done: false,
            })),
        }
    }

    /// New reader positioned at the beginning of the stream.
    fn rewind(&self) -> ReplayCursor {
        ReplayCursor {
            state: Arc::clone(&self.state),
            pos: 0,
        }
    }
}

struct ReplayCursor {
    state: Arc<Mutex<ReplayState>>,
    pos: usize,
}

impl Read for ReplayCursor {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "replay buffer poisoned"))?;

        if self.pos < state.recorded.len() {
            let available = &state.recorded[self.pos..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.pos += n;
            return Ok(n);
        }

        if state.inner_done {
            return Ok(0);
        }

        let n = state.inner.read(buf)?;
        if n == 0 {
            state.inner_done = true;
        } else {
            state.recorded.extend_from_slice(&buf[..n]);
            self.pos += n;
        }
        Ok(n)
    }
}

/// Stream that restarts from the beginning whenever the decoder runs dry.
pub struct LoopingAudioStream {
    replay: ReplayBuffer,
    extension: Option<String>,
    current: StreamingDecoder,
}

impl LoopingAudioStream {
    pub fn new(source: Box<dyn ReadSource>, extension: Option<&str>) -> Result<Self> {
        let replay = ReplayBuffer::new(source);
        let current = StreamingDecoder::new(Box::new(replay.rewind()), extension)?;
        Ok(Self {
            replay,
            extension: extension.map(str::to_string),
            current,
        })
    }
}

impl AudioStream for LoopingAudioStream {
    fn format(&self) -> AudioFormat {
        self.current.format()
    }

    fn read(&mut self, expected_size: usize) -> Result<Vec<u8>> {
        let data = self.current.read(expected_size)?;
        if !data.is_empty() {
            return Ok(data);
        }

        debug!("Looping stream reached end, restarting from the beginning");
        let format = self.current.format();
        self.current = StreamingDecoder::new(
            Box::new(self.replay.rewind()),
            self.extension.as_deref(),
        )?;
        if self.current.format() != format {
            warn!(
                "Looping stream format changed on restart: {:?} -> {:?}",
                format,
                self.current.format()
            );
        }

        // A second empty read means the stream holds no audio at all
        self.current.read(expected_size)
    }
}
