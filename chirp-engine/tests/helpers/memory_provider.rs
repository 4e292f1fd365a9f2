//! In-memory resource provider with open counters

use chirp_common::ResourceLocation;
use chirp_engine::error::{Error, Result};
use chirp_engine::resources::{ReadSource, ResourceProvider};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct MemoryProvider {
    files: Mutex<HashMap<ResourceLocation, Arc<Vec<u8>>>>,
    opens: Mutex<HashMap<ResourceLocation, usize>>,

    /// Artificial latency per open, to make concurrent requests overlap
    delay: Duration,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn insert(&self, location: &str, bytes: Vec<u8>) {
        let location: ResourceLocation = location.parse().unwrap();
        self.files.lock().unwrap().insert(location, Arc::new(bytes));
    }

    /// How many times `location` was opened (including failed opens)
    pub fn open_count(&self, location: &str) -> usize {
        let location: ResourceLocation = location.parse().unwrap();
        self.opens.lock().unwrap().get(&location).copied().unwrap_or(0)
    }
}

impl ResourceProvider for MemoryProvider {
    fn open(&self, location: &ResourceLocation) -> Result<Box<dyn ReadSource>> {
        *self.opens.lock().unwrap().entry(location.clone()).or_default() += 1;

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let bytes = self.files.lock().unwrap().get(location).cloned();
        match bytes {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.as_ref().clone()))),
            None => Err(Error::Resource(format!("{} is not in memory", location))),
        }
    }
}
