use std::path::PathBuf;

use thiserror::Error;

use crate::changeset::ChangeSetError;
use crate::facet::FacetError;

/// Errors raised while packaging or handing off drift content.
#[derive(Debug, Error)]
pub enum SendError {
    /// The changeset used to resolve hashes could not be read.
    #[error(transparent)]
    ChangeSet(#[from] ChangeSetError),
    /// File I/O failed.
    #[error("Content I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The zip archive could not be written.
    #[error("Failed to write content archive {path}: {source}")]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },
    /// Content could not be read through the resource's facet.
    #[error(transparent)]
    Facet(#[from] FacetError),
    /// The transport refused or failed to take the archive.
    #[error("Failed to hand off {path}: {message}")]
    Transport { path: PathBuf, message: String },
}

impl SendError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
