use std::{
    fs::{self, ReadDir},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use tracing::warn;

use crate::changeset::UNKNOWN;
use crate::config::DriftDefinition;
use crate::facet::{FileInfo, FileStatus};

use super::filter::PathFilter;
use super::hash::sha256_file;
use super::strategy::{DetectionStrategy, FileListing};
use super::DetectionError;

/// Detection by walking the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSystemStrategy;

impl FileSystemStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl DetectionStrategy for FileSystemStrategy {
    fn is_base_dir_valid(&self, base_dir: &Path) -> bool {
        base_dir.is_dir()
    }

    fn all_files<'a>(
        &'a self,
        base_dir: &'a Path,
        definition: &'a DriftDefinition,
    ) -> Result<FileListing<'a>, DetectionError> {
        if !self.is_base_dir_valid(base_dir) {
            return Ok(Box::new(std::iter::empty()));
        }
        let filter = PathFilter::from_definition(definition)?;
        Ok(Box::new(
            DirWalk::new(base_dir).filter(move |info| filter.matches(&info.path)),
        ))
    }

    fn file_status(
        &self,
        _definition: &DriftDefinition,
        base_dir: &Path,
        path: &str,
    ) -> Result<FileStatus, DetectionError> {
        let full = base_dir.join(path);
        match fs::metadata(&full) {
            Ok(meta) if meta.is_file() => Ok(FileStatus {
                path: path.to_string(),
                exists: true,
                readable: is_readable(&full),
                last_modified: modified_millis(&meta),
                size: meta.len() as i64,
            }),
            Ok(_) => Ok(FileStatus::missing(path)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileStatus::missing(path)),
            Err(err) => {
                warn!(
                    path = %full.display(),
                    error = %err,
                    "Failed to read file metadata"
                );
                Ok(FileStatus {
                    exists: true,
                    ..FileStatus::missing(path)
                })
            }
        }
    }

    fn sha256(&self, base_dir: &Path, path: &str) -> Result<String, DetectionError> {
        let full = base_dir.join(path);
        sha256_file(&full).map_err(|source| DetectionError::Io { path: full, source })
    }
}

/// Depth-first traversal with an explicit stack of pending directories.
///
/// Symlinks are not followed. Unreadable directories and entries are logged and
/// skipped.
struct DirWalk {
    root: PathBuf,
    stack: Vec<PathBuf>,
    current: Option<ReadDir>,
}

impl DirWalk {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            stack: vec![root.to_path_buf()],
            current: None,
        }
    }

    fn open_next_dir(&mut self) -> bool {
        while let Some(dir) = self.stack.pop() {
            match fs::read_dir(&dir) {
                Ok(entries) => {
                    self.current = Some(entries);
                    return true;
                }
                Err(err) => {
                    warn!(
                        dir = %dir.display(),
                        error = %err,
                        "Failed to read directory during scan"
                    );
                }
            }
        }
        false
    }

    fn file_info(&self, path: &Path) -> Option<FileInfo> {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "Failed to read file metadata during scan"
                );
                return None;
            }
        };
        if !is_readable(path) {
            return None;
        }
        let relative = relative_path(&self.root, path)?;
        Some(FileInfo::new(
            relative,
            modified_millis(&meta),
            meta.len() as i64,
        ))
    }
}

impl Iterator for DirWalk {
    type Item = FileInfo;

    fn next(&mut self) -> Option<FileInfo> {
        loop {
            let Some(entries) = self.current.as_mut() else {
                if !self.open_next_dir() {
                    return None;
                }
                continue;
            };
            let Some(entry_result) = entries.next() else {
                self.current = None;
                continue;
            };
            let entry = match entry_result {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(error = %err, "Failed to read directory entry during scan");
                    continue;
                }
            };
            let path = entry.path();
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "Failed to read file type during scan"
                    );
                    continue;
                }
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                self.stack.push(path);
                continue;
            }
            if file_type.is_file()
                && let Some(info) = self.file_info(&path)
            {
                return Some(info);
            }
        }
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect();
    Some(parts.join("/"))
}

fn modified_millis(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|duration| duration.as_millis().min(i64::MAX as u128) as i64)
        .unwrap_or(UNKNOWN)
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `path` is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(path.as_ptr(), libc::R_OK) == 0 }
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    fs::File::open(path).is_ok()
}
