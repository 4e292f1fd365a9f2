//! Resource providers
//!
//! Maps a `ResourceLocation` to a readable byte source. The engine only ever
//! reads sequentially, so a provider may hand out non-seekable streams.

use crate::error::{Error, Result};
use chirp_common::ResourceLocation;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::trace;

/// Sequential byte source usable from any thread.
pub trait ReadSource: Read + Send + Sync {}

impl<T: Read + Send + Sync> ReadSource for T {}

/// Opens resources by location.
pub trait ResourceProvider: Send + Sync {
    fn open(&self, location: &ResourceLocation) -> Result<Box<dyn ReadSource>>;
}

/// File extension of a location's path, used as a decoder hint.
pub fn extension_of(location: &ResourceLocation) -> Option<&str> {
    let file_name = location.path().rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    Some(ext)
}

/// Resources on disk under `<root>/<namespace>/<path>`.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    root: PathBuf,
}

impl DirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path for `location`
    pub fn resolve(&self, location: &ResourceLocation) -> PathBuf {
        let mut path = self.root.join(location.namespace());
        for segment in location.path().split('/') {
            path.push(segment);
        }
        path
    }
}

impl ResourceProvider for DirectoryProvider {
    fn open(&self, location: &ResourceLocation) -> Result<Box<dyn ReadSource>> {
        let path = self.resolve(location);
        trace!("Opening resource {} at {}", location, path.display());

        match File::open(&path) {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::Resource(format!(
                "Resource {} not found at {}",
                location,
                path.display()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
