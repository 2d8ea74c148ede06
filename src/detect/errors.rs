use std::path::PathBuf;

use thiserror::Error;

use crate::changeset::ChangeSetError;
use crate::facet::{FacetError, LockError};

/// Errors raised by a detection cycle.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// Reading or writing a changeset failed.
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),
    /// A file under the base directory could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The resource's facet reported an error.
    #[error(transparent)]
    Facet(FacetError),
    /// The resource lock could not be acquired in time.
    #[error(transparent)]
    Lock(LockError),
    /// An include or exclude wildcard did not compile.
    #[error("Invalid filter pattern {pattern:?}: {source}")]
    Filter {
        pattern: String,
        source: ignore::Error,
    },
    /// The first coverage snapshot of a lineage was requested twice.
    #[error("Coverage snapshot {} already exists", path.display())]
    SnapshotExists { path: PathBuf },
    /// No base directory is known for the resource.
    #[error("Resource {0} is not known to the agent")]
    UnknownResource(i32),
}

impl From<FacetError> for DetectionError {
    fn from(err: FacetError) -> Self {
        match err {
            FacetError::Lock(err) => DetectionError::Lock(err),
            other => DetectionError::Facet(other),
        }
    }
}

impl From<LockError> for DetectionError {
    fn from(err: LockError) -> Self {
        DetectionError::Lock(err)
    }
}

impl DetectionError {
    /// True for failures scoped to a single file; the cycle skips the file and goes on.
    pub fn is_per_file(&self) -> bool {
        matches!(self, DetectionError::Io { .. } | DetectionError::Facet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn facet_lock_errors_surface_as_lock_errors() {
        let err: DetectionError = FacetError::Lock(LockError::Timeout {
            resource_id: 3,
            mode: "read",
            timeout: Duration::from_millis(5),
        })
        .into();
        assert!(matches!(err, DetectionError::Lock(_)));
        assert!(!err.is_per_file());

        let err: DetectionError = FacetError::Component("boom".into()).into();
        assert!(err.is_per_file());
    }
}
