use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
    time::Duration,
};

use crate::detect::ResourceLocator;
use crate::facet::{DriftDetectionFacet, LockedFacet, ResourceLocks};

use super::SendError;

/// Where the bytes of a tracked file are read from.
///
/// Chosen once per send: resources exposing a facet are read through it,
/// everything else straight from disk.
pub enum ContentSource {
    FileSystem,
    Facet(LockedFacet),
}

impl ContentSource {
    pub fn for_resource(
        locator: &dyn ResourceLocator,
        locks: &ResourceLocks,
        resource_id: i32,
        lock_timeout: Duration,
    ) -> Self {
        match locator.facet(resource_id) {
            Some(facet) => Self::facet(facet, locks, resource_id, lock_timeout),
            None => Self::FileSystem,
        }
    }

    pub fn facet(
        facet: Arc<dyn DriftDetectionFacet>,
        locks: &ResourceLocks,
        resource_id: i32,
        lock_timeout: Duration,
    ) -> Self {
        Self::Facet(LockedFacet::new(
            facet,
            locks.lock_for(resource_id),
            lock_timeout,
        ))
    }

    /// Open one file for streaming into the archive.
    pub fn open(&self, base_dir: &str, path: &str) -> Result<Box<dyn Read + Send>, SendError> {
        match self {
            Self::FileSystem => {
                let full = Path::new(base_dir).join(path);
                let file = File::open(&full).map_err(|source| SendError::io(full, source))?;
                Ok(Box::new(BufReader::new(file)))
            }
            Self::Facet(facet) => Ok(facet.open_stream(base_dir, path)?),
        }
    }
}
