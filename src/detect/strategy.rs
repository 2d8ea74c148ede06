use std::path::Path;

use crate::config::DriftDefinition;
use crate::facet::{FileInfo, FileStatus};

use super::DetectionError;

/// Lazy sequence of the files currently present under a base directory.
pub type FileListing<'a> = Box<dyn Iterator<Item = FileInfo> + 'a>;

/// Scan and hash operations for one kind of resource.
///
/// Implementations never fail a listing because one file is unreadable; such
/// files are logged and left out. Errors returned from these methods are either
/// scoped to one file (see [`DetectionError::is_per_file`]) or abort the cycle.
pub trait DetectionStrategy: Send + Sync {
    /// Whether the base directory can be scanned at all.
    fn is_base_dir_valid(&self, base_dir: &Path) -> bool;

    /// Every tracked file under `base_dir`, honoring the definition's filters.
    ///
    /// Each call starts a fresh traversal. Listings do not hash file content.
    fn all_files<'a>(
        &'a self,
        base_dir: &'a Path,
        definition: &'a DriftDefinition,
    ) -> Result<FileListing<'a>, DetectionError>;

    /// Current status of one previously known file.
    fn file_status(
        &self,
        definition: &DriftDefinition,
        base_dir: &Path,
        path: &str,
    ) -> Result<FileStatus, DetectionError>;

    /// Content hash of one file.
    fn sha256(&self, base_dir: &Path, path: &str) -> Result<String, DetectionError>;
}
