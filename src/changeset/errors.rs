use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading or writing changeset files.
#[derive(Debug, Error)]
pub enum ChangeSetError {
    /// A changeset file or directory could not be accessed.
    #[error("Changeset I/O failed for {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// A record in a changeset file could not be decoded.
    #[error("Malformed changeset {path} at line {line}: {source}")]
    Parse {
        /// Changeset file path.
        path: PathBuf,
        /// One-based line number of the bad record.
        line: usize,
        /// Decoder error.
        source: serde_json::Error,
    },
    /// A record could not be encoded.
    #[error("Failed to encode changeset record for {path}: {source}")]
    Encode {
        /// Changeset file path.
        path: PathBuf,
        /// Encoder error.
        source: serde_json::Error,
    },
    /// The changeset file has no header record.
    #[error("Changeset {0} is missing its header record")]
    MissingHeaders(PathBuf),
    /// The requested changeset does not exist.
    #[error("Changeset {0} does not exist")]
    NotFound(PathBuf),
    /// A definition name cannot be used as a directory name.
    #[error("Invalid definition name for changeset storage: {0:?}")]
    InvalidName(String),
}

impl ChangeSetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
