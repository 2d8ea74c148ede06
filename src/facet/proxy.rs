use std::{io::Read, sync::Arc, time::Duration};

use crate::config::DriftDefinition;

use super::lock::{ReadGuard, ResourceLock};
use super::{Drift, DriftDetectionFacet, FacetError, FileStatus};

/// Facet wrapper that holds the resource's read lock around every call.
///
/// Streams returned by [`DriftDetectionFacet::open_stream`] keep the lock until
/// they are dropped, so content is never read while the component is being
/// reconfigured.
pub struct LockedFacet {
    facet: Arc<dyn DriftDetectionFacet>,
    lock: Arc<ResourceLock>,
    timeout: Duration,
}

impl LockedFacet {
    pub fn new(
        facet: Arc<dyn DriftDetectionFacet>,
        lock: Arc<ResourceLock>,
        timeout: Duration,
    ) -> Self {
        Self {
            facet,
            lock,
            timeout,
        }
    }

    fn guard(&self) -> Result<ReadGuard, FacetError> {
        Ok(self.lock.read(self.timeout)?)
    }
}

impl DriftDetectionFacet for LockedFacet {
    fn generate_snapshot(
        &self,
        definition: &DriftDefinition,
        base_dir: &str,
    ) -> Result<Vec<Drift>, FacetError> {
        let _guard = self.guard()?;
        self.facet.generate_snapshot(definition, base_dir)
    }

    fn file_status(
        &self,
        definition: &DriftDefinition,
        base_dir: &str,
        path: &str,
    ) -> Result<FileStatus, FacetError> {
        let _guard = self.guard()?;
        self.facet.file_status(definition, base_dir, path)
    }

    fn open_stream(&self, base_dir: &str, path: &str) -> Result<Box<dyn Read + Send>, FacetError> {
        let guard = self.guard()?;
        let inner = self.facet.open_stream(base_dir, path)?;
        Ok(Box::new(GuardedStream {
            inner,
            _guard: guard,
        }))
    }
}

struct GuardedStream {
    inner: Box<dyn Read + Send>,
    _guard: ReadGuard,
}

impl Read for GuardedStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}
