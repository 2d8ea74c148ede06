use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::changeset::{ChangeSetError, FileEntry};
use crate::facet::{FileInfo, FileStatus};

use super::DetectionError;

/// Point lookups the classifier needs for files it already knows about.
pub trait FileProbe {
    fn status(&mut self, path: &str) -> Result<FileStatus, DetectionError>;
    fn sha256(&mut self, path: &str) -> Result<String, DetectionError>;
}

/// Result of comparing a snapshot against the files currently present.
///
/// Every path lands in exactly one of `unchanged`, `changed`, `removed` or
/// `added`. `pinned_updates` holds the original snapshot entries of changed
/// and removed files when the comparison snapshot is a pinned baseline.
#[derive(Debug, Default)]
pub struct Classification {
    pub unchanged: Vec<FileEntry>,
    pub changed: Vec<FileEntry>,
    pub removed: Vec<FileEntry>,
    pub added: Vec<FileEntry>,
    pub pinned_updates: Vec<FileEntry>,
    /// Cached size or timestamp was refreshed on an unchanged entry.
    pub backfilled: bool,
}

impl Classification {
    /// Entries of the next coverage snapshot: unchanged, changed, then added.
    pub fn snapshot_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.unchanged
            .iter()
            .chain(&self.changed)
            .chain(&self.added)
    }

    /// Entries of the delta changeset: changed, removed, then added.
    pub fn delta_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.changed.iter().chain(&self.removed).chain(&self.added)
    }

    /// Entries of a rewritten pinned snapshot.
    pub fn pinned_entries(&self) -> impl Iterator<Item = &FileEntry> {
        self.pinned_updates.iter().chain(&self.unchanged)
    }

    pub fn has_drift(&self) -> bool {
        !(self.changed.is_empty() && self.removed.is_empty() && self.added.is_empty())
    }

    pub fn delta_len(&self) -> usize {
        self.changed.len() + self.removed.len() + self.added.len()
    }
}

/// Bucket every file into unchanged, changed, removed or added.
///
/// `snapshot` is the comparison snapshot in stored order and `current` the
/// listing of files present now. Known files are hashed only when their cached
/// metadata is unknown or disagrees with the probe; files that are new are
/// hashed unless the listing already carries a hash. Per-file probe failures
/// are logged: a known file that cannot be checked counts as removed and a new
/// file that cannot be hashed is left out. Any other error aborts.
pub fn classify<S, C>(
    snapshot: S,
    current: C,
    probe: &mut dyn FileProbe,
    pinned: bool,
) -> Result<Classification, DetectionError>
where
    S: IntoIterator<Item = Result<FileEntry, ChangeSetError>>,
    C: IntoIterator<Item = FileInfo>,
{
    let mut new_files: BTreeMap<String, FileInfo> = current
        .into_iter()
        .map(|info| (info.path.clone(), info))
        .collect();
    let mut result = Classification::default();

    for entry in snapshot {
        let mut entry = entry?;
        new_files.remove(&entry.path);

        let status = match probe.status(&entry.path) {
            Ok(status) => status,
            Err(err) if err.is_per_file() => {
                warn!(path = %entry.path, error = %err, "Failed to check file status");
                FileStatus::missing(entry.path.as_str())
            }
            Err(err) => return Err(err),
        };
        if !status.is_available() {
            debug!(
                path = %entry.path,
                state = if status.exists { "unreadable" } else { "deleted" },
                "Detected removed file"
            );
            mark_removed(&mut result, entry, pinned);
            continue;
        }

        let metadata_matches = entry.has_cached_metadata()
            && entry.last_modified == status.last_modified
            && entry.size == status.size;
        if metadata_matches {
            result.unchanged.push(entry);
            continue;
        }

        let current_hash = match probe.sha256(&entry.path) {
            Ok(hash) => hash,
            Err(err) if err.is_per_file() => {
                warn!(path = %entry.path, error = %err, "Failed to hash known file");
                mark_removed(&mut result, entry, pinned);
                continue;
            }
            Err(err) => return Err(err),
        };
        let stored = entry.current_hash().unwrap_or_default().to_string();
        if stored == current_hash {
            entry.last_modified = status.last_modified;
            entry.size = status.size;
            result.backfilled = true;
            result.unchanged.push(entry);
            continue;
        }
        info!(path = %entry.path, "Detected changed file");
        result.changed.push(FileEntry::changed(
            entry.path.as_str(),
            stored,
            current_hash,
            status.last_modified,
            status.size,
        ));
        if pinned {
            result.pinned_updates.push(entry);
        }
    }

    for (path, info) in new_files {
        let hash = match info.hash {
            Some(hash) => hash,
            None => match probe.sha256(&path) {
                Ok(hash) => hash,
                Err(err) if err.is_per_file() => {
                    warn!(path = %path, error = %err, "Failed to hash added file, skipping");
                    continue;
                }
                Err(err) => return Err(err),
            },
        };
        info!(path = %path, "Detected added file");
        result
            .added
            .push(FileEntry::added(path, hash, info.last_modified, info.size));
    }

    Ok(result)
}

fn mark_removed(result: &mut Classification, entry: FileEntry, pinned: bool) {
    let old_hash = entry.current_hash().unwrap_or_default().to_string();
    result
        .removed
        .push(FileEntry::removed(entry.path.as_str(), old_hash));
    if pinned {
        result.pinned_updates.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{FileEntryType, UNKNOWN};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[derive(Default)]
    struct FakeProbe {
        files: HashMap<String, (FileStatus, String)>,
        broken: Vec<String>,
        hashed: Vec<String>,
    }

    impl FakeProbe {
        fn with(mut self, path: &str, last_modified: i64, size: i64, hash: &str) -> Self {
            self.files.insert(
                path.to_string(),
                (
                    FileStatus::present(path, last_modified, size),
                    hash.to_string(),
                ),
            );
            self
        }

        fn listing(&self) -> Vec<FileInfo> {
            self.files
                .values()
                .map(|(status, _)| FileInfo::new(status.path.as_str(), status.last_modified, status.size))
                .collect()
        }
    }

    impl FileProbe for FakeProbe {
        fn status(&mut self, path: &str) -> Result<FileStatus, DetectionError> {
            Ok(self
                .files
                .get(path)
                .map(|(status, _)| status.clone())
                .unwrap_or_else(|| FileStatus::missing(path)))
        }

        fn sha256(&mut self, path: &str) -> Result<String, DetectionError> {
            self.hashed.push(path.to_string());
            if self.broken.iter().any(|broken| broken == path) {
                return Err(DetectionError::Io {
                    path: PathBuf::from(path),
                    source: std::io::Error::other("read failed"),
                });
            }
            self.files
                .get(path)
                .map(|(_, hash)| hash.clone())
                .ok_or_else(|| DetectionError::Io {
                    path: PathBuf::from(path),
                    source: std::io::ErrorKind::NotFound.into(),
                })
        }
    }

    fn ok(entries: Vec<FileEntry>) -> Vec<Result<FileEntry, ChangeSetError>> {
        entries.into_iter().map(Ok).collect()
    }

    fn paths(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.path.as_str()).collect()
    }

    #[test]
    fn every_file_lands_in_exactly_one_bucket() {
        let snapshot = vec![
            FileEntry::added("same.txt", "h-same", 10, 1),
            FileEntry::added("edited.txt", "h-old", 10, 1),
            FileEntry::added("gone.txt", "h-gone", 10, 1),
        ];
        let mut probe = FakeProbe::default()
            .with("same.txt", 10, 1, "h-same")
            .with("edited.txt", 20, 2, "h-new")
            .with("fresh.txt", 30, 3, "h-fresh");
        let listing = probe.listing();

        let result = classify(ok(snapshot), listing, &mut probe, false).unwrap();
        assert_eq!(paths(&result.unchanged), vec!["same.txt"]);
        assert_eq!(paths(&result.changed), vec!["edited.txt"]);
        assert_eq!(paths(&result.removed), vec!["gone.txt"]);
        assert_eq!(paths(&result.added), vec!["fresh.txt"]);

        let changed = &result.changed[0];
        assert_eq!(changed.old_hash.as_deref(), Some("h-old"));
        assert_eq!(changed.new_hash.as_deref(), Some("h-new"));
        assert_eq!((changed.last_modified, changed.size), (20, 2));
        assert_eq!(result.removed[0].old_hash.as_deref(), Some("h-gone"));
        assert_eq!(result.removed[0].kind, FileEntryType::Removed);
        assert!(result.pinned_updates.is_empty());
        assert!(!result.backfilled);
        assert_eq!(result.delta_len(), 3);
    }

    #[test]
    fn matching_metadata_skips_hashing() {
        let snapshot = vec![FileEntry::added("a.txt", "h1", 10, 1)];
        let mut probe = FakeProbe::default().with("a.txt", 10, 1, "would-differ");
        let listing = probe.listing();

        let result = classify(ok(snapshot), listing, &mut probe, false).unwrap();
        assert_eq!(paths(&result.unchanged), vec!["a.txt"]);
        assert!(probe.hashed.is_empty());
        assert!(!result.has_drift());
    }

    #[test]
    fn unknown_metadata_is_backfilled_when_content_matches() {
        let entry = FileEntry::added("a.txt", "h1", UNKNOWN, UNKNOWN);
        let mut probe = FakeProbe::default().with("a.txt", 42, 7, "h1");
        let listing = probe.listing();

        let result = classify(ok(vec![entry]), listing, &mut probe, false).unwrap();
        assert!(result.backfilled);
        assert!(!result.has_drift());
        assert_eq!(result.unchanged[0].last_modified, 42);
        assert_eq!(result.unchanged[0].size, 7);
    }

    #[test]
    fn pinned_updates_keep_the_original_entries() {
        let snapshot = vec![
            FileEntry::added("edited.txt", "h-old", 10, 1),
            FileEntry::added("gone.txt", "h-gone", 10, 1),
            FileEntry::added("same.txt", "h-same", 10, 1),
        ];
        let mut probe = FakeProbe::default()
            .with("edited.txt", 11, 1, "h-new")
            .with("same.txt", 10, 1, "h-same");
        let listing = probe.listing();

        let result = classify(ok(snapshot), listing, &mut probe, true).unwrap();
        let updates = &result.pinned_updates;
        assert_eq!(paths(updates), vec!["edited.txt", "gone.txt"]);
        assert!(updates.iter().all(|entry| entry.kind == FileEntryType::Added));
        assert_eq!(updates[0].new_hash.as_deref(), Some("h-old"));
        let pinned: Vec<_> = result.pinned_entries().map(|e| e.path.as_str()).collect();
        assert_eq!(pinned, vec!["edited.txt", "gone.txt", "same.txt"]);
    }

    #[test]
    fn hash_failures_remove_known_files_and_skip_new_ones() {
        let snapshot = vec![FileEntry::added("known.txt", "h1", 10, 1)];
        let mut probe = FakeProbe::default()
            .with("known.txt", 11, 1, "h1")
            .with("new.txt", 5, 5, "h5");
        probe.broken = vec!["known.txt".into(), "new.txt".into()];
        let listing = probe.listing();

        let result = classify(ok(snapshot), listing, &mut probe, false).unwrap();
        assert_eq!(paths(&result.removed), vec!["known.txt"]);
        assert!(result.added.is_empty());
    }

    #[test]
    fn listing_hashes_are_trusted_for_added_files() {
        let mut probe = FakeProbe::default();
        let listing = vec![FileInfo::new("virtual.xml", 1, 1).with_hash("h-facet")];
        let result = classify(Vec::new(), listing, &mut probe, false).unwrap();
        assert_eq!(result.added[0].new_hash.as_deref(), Some("h-facet"));
        assert!(probe.hashed.is_empty());
    }

    #[test]
    fn snapshot_read_errors_abort() {
        let mut probe = FakeProbe::default();
        let snapshot = vec![Err(ChangeSetError::MissingHeaders(PathBuf::from("x")))];
        assert!(classify(snapshot, Vec::new(), &mut probe, false).is_err());
    }

    #[test]
    fn composed_views_follow_bucket_order() {
        let snapshot = vec![
            FileEntry::added("b.txt", "hb", 1, 1),
            FileEntry::added("c.txt", "hc", 1, 1),
        ];
        let mut probe = FakeProbe::default()
            .with("b.txt", 1, 1, "hb")
            .with("c.txt", 2, 2, "hc2")
            .with("a.txt", 3, 3, "ha");
        let listing = probe.listing();
        let result = classify(ok(snapshot), listing, &mut probe, false).unwrap();

        let snapshot: Vec<_> = result.snapshot_entries().map(|e| e.path.as_str()).collect();
        assert_eq!(snapshot, vec!["b.txt", "c.txt", "a.txt"]);
        let delta: Vec<_> = result.delta_entries().map(|e| e.path.as_str()).collect();
        assert_eq!(delta, vec!["c.txt", "a.txt"]);
    }
}
