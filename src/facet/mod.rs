//! Capability interface for resources that report their own files.
//!
//! Components that manage content not directly visible on the local
//! filesystem implement [`DriftDetectionFacet`]. The agent always talks to a
//! facet through [`LockedFacet`], which takes the resource's read lock with a
//! bounded wait around every call.

mod lock;
mod proxy;
mod types;

use std::io::Read;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::DriftDefinition;

pub use lock::{
    DEFAULT_LOCK_TIMEOUT, LockError, ReadGuard, ResourceLock, ResourceLocks, WriteGuard,
};
pub use proxy::LockedFacet;
pub use types::{Drift, DriftCategory, DriftFile, FileInfo, FileStatus};

/// Errors surfaced by facet implementations.
#[derive(Debug, Error)]
pub enum FacetError {
    /// The facet could not access a file.
    #[error("Facet I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The component reported a failure of its own.
    #[error("Resource component error: {0}")]
    Component(String),
    /// The resource lock could not be acquired in time.
    #[error(transparent)]
    Lock(#[from] LockError),
}

/// File listing, status and content access provided by a managed component.
pub trait DriftDetectionFacet: Send + Sync {
    /// Report every file currently tracked under `base_dir` for the definition.
    fn generate_snapshot(
        &self,
        definition: &DriftDefinition,
        base_dir: &str,
    ) -> Result<Vec<Drift>, FacetError>;

    /// Status of one previously known file.
    fn file_status(
        &self,
        definition: &DriftDefinition,
        base_dir: &str,
        path: &str,
    ) -> Result<FileStatus, FacetError>;

    /// Open the content of one file.
    fn open_stream(&self, base_dir: &str, path: &str) -> Result<Box<dyn Read + Send>, FacetError>;
}
