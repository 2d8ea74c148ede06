use std::path::{Path, PathBuf};

use super::{Category, ChangeSetError, FileEntry, Headers};

/// File name of the live coverage snapshot inside a definition's directory.
pub const COVERAGE_FILE: &str = "changeset.txt";
/// File name of the most recent delta changeset.
pub const DRIFT_FILE: &str = "drift-changeset.txt";
/// File name of the pinned baseline snapshot.
pub const PINNED_SNAPSHOT_FILE: &str = "snapshot.pinned";
/// Suffix appended to a coverage snapshot when it is backed up before replacement.
pub const PREVIOUS_SUFFIX: &str = ".previous";

/// Sequential access to a changeset in write order.
pub trait ChangeSetReader: Iterator<Item = Result<FileEntry, ChangeSetError>> {
    /// Header record of the changeset being read.
    fn headers(&self) -> &Headers;
}

/// Append access to a changeset being produced.
///
/// Nothing becomes visible at the target path until [`ChangeSetWriter::close`]
/// succeeds; dropping an unclosed writer discards what was written.
pub trait ChangeSetWriter {
    /// Append one entry.
    fn write(&mut self, entry: &FileEntry) -> Result<(), ChangeSetError>;
    /// Finalize the changeset and publish it at its target path.
    fn close(self: Box<Self>) -> Result<(), ChangeSetError>;
}

/// Locates, reads and writes changeset files for (resource, definition) pairs.
pub trait ChangeSetStore: Send + Sync {
    /// Path of the changeset with the given role, creating its directory if needed.
    fn find_changeset(
        &self,
        resource_id: i32,
        definition_name: &str,
        category: Category,
    ) -> Result<PathBuf, ChangeSetError>;

    /// Open a changeset for sequential reading.
    fn reader(&self, path: &Path) -> Result<Box<dyn ChangeSetReader>, ChangeSetError>;

    /// Open a writer that replaces `path` when closed.
    fn writer(
        &self,
        path: &Path,
        headers: Headers,
    ) -> Result<Box<dyn ChangeSetWriter>, ChangeSetError>;

    /// Whether a changeset exists at `path`.
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    /// Copy a changeset, atomically replacing the destination.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), ChangeSetError>;

    /// Delete a changeset; deleting a missing file is not an error.
    fn remove(&self, path: &Path) -> Result<(), ChangeSetError>;

    /// Purge every changeset stored for a definition.
    fn delete_changesets(&self, resource_id: i32, definition_name: &str)
    -> Result<(), ChangeSetError>;
}

/// Pinned snapshot that sits beside a coverage snapshot.
pub fn pinned_snapshot_path(coverage: &Path) -> PathBuf {
    coverage.with_file_name(PINNED_SNAPSHOT_FILE)
}

/// Most recent delta changeset that sits beside a coverage snapshot.
pub fn delta_path_beside(coverage: &Path) -> PathBuf {
    coverage.with_file_name(DRIFT_FILE)
}

/// Backup location used when a coverage snapshot is replaced.
pub fn previous_snapshot_path(coverage: &Path) -> PathBuf {
    let mut name = coverage
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| COVERAGE_FILE.to_string());
    name.push_str(PREVIOUS_SUFFIX);
    coverage.with_file_name(name)
}

/// Read every entry of a changeset into memory.
pub fn read_all(
    store: &dyn ChangeSetStore,
    path: &Path,
) -> Result<(Headers, Vec<FileEntry>), ChangeSetError> {
    let reader = store.reader(path)?;
    let headers = reader.headers().clone();
    let entries = reader.collect::<Result<Vec<_>, _>>()?;
    Ok((headers, entries))
}

/// Write a complete changeset in one call.
pub fn write_all<'a>(
    store: &dyn ChangeSetStore,
    path: &Path,
    headers: Headers,
    entries: impl IntoIterator<Item = &'a FileEntry>,
) -> Result<(), ChangeSetError> {
    let mut writer = store.writer(path, headers)?;
    for entry in entries {
        writer.write(entry)?;
    }
    writer.close()
}
