//! Integration tests for SoundBufferLibrary
//!
//! Covers decode deduplication under concurrent requests, eviction of failed
//! decodes, and independence of streams.

mod helpers;

use chirp_common::{ResourceLocation, Sound};
use chirp_engine::audio::AudioStream;
use chirp_engine::backend::HeadlessBackend;
use chirp_engine::playback::SoundBufferLibrary;
use helpers::{sine_wav, MemoryProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

const BEEP: &str = "chirp:sounds/beep.ogg";

fn loc(s: &str) -> ResourceLocation {
    s.parse().unwrap()
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn library(runtime: &Runtime, provider: &Arc<MemoryProvider>) -> SoundBufferLibrary {
    SoundBufferLibrary::new(
        provider.clone(),
        Arc::new(HeadlessBackend::new()),
        runtime.handle().clone(),
    )
}

#[test]
fn test_concurrent_requests_decode_once() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::with_delay(Duration::from_millis(50)));
    provider.insert(BEEP, sine_wav(1600, 440.0, 0.5));
    let library = Arc::new(library(&runtime, &provider));

    let callers: Vec<_> = (0..3)
        .map(|_| {
            let library = Arc::clone(&library);
            std::thread::spawn(move || library.get_complete_buffer(&loc(BEEP)))
        })
        .collect();
    let futures: Vec<_> = callers.into_iter().map(|c| c.join().unwrap()).collect();

    let buffers: Vec<_> = runtime
        .block_on(futures::future::join_all(futures))
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    assert_eq!(provider.open_count(BEEP), 1);
    assert!(Arc::ptr_eq(&buffers[0], &buffers[1]));
    assert!(Arc::ptr_eq(&buffers[1], &buffers[2]));
    assert_eq!(buffers[0].bytes().len(), 1600 * 4);
    assert_eq!(library.len(), 1);

    // Completed entries are served from the cache
    let again = runtime.block_on(library.get_complete_buffer(&loc(BEEP))).unwrap();
    assert!(Arc::ptr_eq(&again, &buffers[0]));
    assert_eq!(provider.open_count(BEEP), 1);
}

#[test]
fn test_failed_decode_is_evicted_and_retried() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::new());
    let library = library(&runtime, &provider);

    let first = runtime.block_on(library.get_complete_buffer(&loc(BEEP)));
    assert!(first.is_err());
    assert!(library.is_empty());

    provider.insert(BEEP, sine_wav(800, 440.0, 0.5));
    let second = runtime.block_on(library.get_complete_buffer(&loc(BEEP)));
    assert!(second.is_ok());
    assert_eq!(provider.open_count(BEEP), 2);
}

#[test]
fn test_corrupt_file_reports_decode_error() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::new());
    provider.insert(BEEP, b"definitely not an audio file".to_vec());
    let library = library(&runtime, &provider);

    let error = runtime
        .block_on(library.get_complete_buffer(&loc(BEEP)))
        .unwrap_err();
    assert!(matches!(*error, chirp_engine::Error::Decode(_)));
}

#[test]
fn test_clear_forces_fresh_decode() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::new());
    provider.insert(BEEP, sine_wav(800, 440.0, 0.5));
    let library = library(&runtime, &provider);

    let first = runtime.block_on(library.get_complete_buffer(&loc(BEEP))).unwrap();
    library.clear();
    assert!(library.is_empty());

    let second = runtime.block_on(library.get_complete_buffer(&loc(BEEP))).unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first.bytes(), second.bytes());
    assert_eq!(provider.open_count(BEEP), 2);
}

#[test]
fn test_preload_warms_cache() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::new());
    provider.insert(BEEP, sine_wav(800, 440.0, 0.5));
    let library = library(&runtime, &provider);

    let sounds = vec![Sound::file(loc("chirp:beep")), Sound::file(loc("chirp:missing"))];
    runtime.block_on(library.preload(&sounds)).unwrap();

    // The failed entry is gone, the decoded one stays
    assert_eq!(library.len(), 1);
    runtime.block_on(library.get_complete_buffer(&loc(BEEP))).unwrap();
    assert_eq!(provider.open_count(BEEP), 1);
}

#[test]
fn test_streams_are_independent() {
    let runtime = runtime();
    let provider = Arc::new(MemoryProvider::new());
    provider.insert(BEEP, sine_wav(800, 440.0, 0.5));
    let library = library(&runtime, &provider);

    let mut a = runtime
        .block_on(library.get_stream(&loc(BEEP), false))
        .unwrap()
        .unwrap();
    let mut b = runtime
        .block_on(library.get_stream(&loc(BEEP), false))
        .unwrap()
        .unwrap();

    let all_a = a.read(1 << 20).unwrap();
    assert_eq!(all_a.len(), 800 * 4);
    assert!(a.read(1024).unwrap().is_empty());

    // Draining `a` does not advance `b`
    let all_b = b.read(1 << 20).unwrap();
    assert_eq!(all_a, all_b);
    assert_eq!(provider.open_count(BEEP), 2);
    assert!(library.is_empty());
}
