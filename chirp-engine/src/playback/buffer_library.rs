//! Sound buffer library
//!
//! Memoized asynchronous decode of sound files. The first request for a
//! location spawns a blocking decode on the runtime's worker pool; concurrent
//! and later requests share that one in-flight future. A failed decode is
//! reported to everyone waiting on it and then evicted, so a later request
//! starts a fresh attempt.
//!
//! Streams are never cached: every caller gets its own cursor.

use crate::audio::{AudioStream, LoopingAudioStream, SoundBuffer, StreamingDecoder};
use crate::backend::AudioBackend;
use crate::error::{Error, Result};
use crate::resources::{extension_of, ResourceProvider};
use chirp_common::{ResourceLocation, Sound};
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Outcome shared by every waiter on one decode
pub type BufferResult = std::result::Result<Arc<SoundBuffer>, Arc<Error>>;

/// Shareable handle to an in-flight or completed decode
pub type BufferFuture = Shared<BoxFuture<'static, BufferResult>>;

struct CacheEntry {
    /// Distinguishes this attempt from a later one for the same location
    attempt: u64,
    future: BufferFuture,
}

type Cache = Mutex<HashMap<ResourceLocation, CacheEntry>>;

fn lock(cache: &Cache) -> MutexGuard<'_, HashMap<ResourceLocation, CacheEntry>> {
    cache.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SoundBufferLibrary {
    provider: Arc<dyn ResourceProvider>,
    backend: Arc<dyn AudioBackend>,
    runtime: Handle,
    cache: Arc<Cache>,
    next_attempt: AtomicU64,
}

impl SoundBufferLibrary {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        backend: Arc<dyn AudioBackend>,
        runtime: Handle,
    ) -> Self {
        Self {
            provider,
            backend,
            runtime,
            cache: Arc::new(Mutex::new(HashMap::new())),
            next_attempt: AtomicU64::new(1),
        }
    }

    /// Fully decoded buffer for `location`, decoding at most once while cached.
    pub fn get_complete_buffer(&self, location: &ResourceLocation) -> BufferFuture {
        let mut cache = lock(&self.cache);
        match cache.entry(location.clone()) {
            Entry::Occupied(entry) => entry.get().future.clone(),
            Entry::Vacant(entry) => {
                let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
                let future = self.spawn_decode(location.clone(), attempt);
                entry.insert(CacheEntry {
                    attempt,
                    future: future.clone(),
                });
                future
            }
        }
    }

    fn spawn_decode(&self, location: ResourceLocation, attempt: u64) -> BufferFuture {
        let provider = Arc::clone(&self.provider);
        let cache: Weak<Cache> = Arc::downgrade(&self.cache);

        let decode_location = location.clone();
        let task = self
            .runtime
            .spawn_blocking(move || decode_buffer(provider.as_ref(), &decode_location));

        async move {
            let result: BufferResult = match task.await {
                Ok(Ok(buffer)) => Ok(Arc::new(buffer)),
                Ok(Err(e)) => Err(Arc::new(e)),
                Err(e) => Err(Arc::new(Error::Internal(format!(
                    "Decode worker for {} failed: {}",
                    location, e
                )))),
            };

            if let Err(e) = &result {
                debug!("Evicting failed decode of {}: {}", location, e);
                if let Some(cache) = cache.upgrade() {
                    let mut cache = lock(&cache);
                    if cache.get(&location).is_some_and(|entry| entry.attempt == attempt) {
                        cache.remove(&location);
                    }
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    /// Independent decoder over `location`, looping if requested.
    pub fn get_stream(
        &self,
        location: &ResourceLocation,
        looping: bool,
    ) -> JoinHandle<Result<Box<dyn AudioStream>>> {
        let provider = Arc::clone(&self.provider);
        let location = location.clone();
        self.runtime.spawn_blocking(move || {
            let source = provider.open(&location)?;
            let extension = extension_of(&location);
            let stream: Box<dyn AudioStream> = if looping {
                Box::new(LoopingAudioStream::new(source, extension)?)
            } else {
                Box::new(StreamingDecoder::new(source, extension)?)
            };
            Ok(stream)
        })
    }

    /// Warm the cache for `sounds` in the background.
    pub fn preload(&self, sounds: &[Sound]) -> JoinHandle<()> {
        let futures: Vec<BufferFuture> = sounds
            .iter()
            .map(|sound| self.get_complete_buffer(&sound.path()))
            .collect();
        let count = futures.len();

        self.runtime.spawn(async move {
            let failed = join_all(futures)
                .await
                .iter()
                .filter(|result| result.is_err())
                .count();
            debug!("Preloaded {} sounds ({} failed)", count - failed, failed);
        })
    }

    /// Release hardware storage of every completed buffer and empty the cache.
    pub fn clear(&self) {
        let mut cache = lock(&self.cache);
        for entry in cache.values() {
            if let Some(Ok(buffer)) = entry.future.peek() {
                buffer.discard(self.backend.as_ref());
            }
        }
        cache.clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.cache).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn decode_buffer(provider: &dyn ResourceProvider, location: &ResourceLocation) -> Result<SoundBuffer> {
    let source = provider.open(location)?;
    let mut decoder = StreamingDecoder::new(source, extension_of(location))?;
    let pcm = decoder.read_all()?;
    debug!(
        "Decoded {} ({} bytes, {:?})",
        location,
        pcm.bytes.len(),
        pcm.duration()
    );
    Ok(SoundBuffer::new(pcm))
}
