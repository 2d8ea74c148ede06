use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Marker for metadata the entry does not know yet.
///
/// Snapshots provided by a server or carried over from a pinned baseline do not
/// record timestamps or sizes, so those fields default to this value.
pub const UNKNOWN: i64 = -1;

/// Classification of a file inside a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileEntryType {
    #[serde(rename = "A")]
    Added,
    #[serde(rename = "C")]
    Changed,
    #[serde(rename = "R")]
    Removed,
}

/// One file's drift state within a coverage snapshot or a delta changeset.
///
/// Entries are equal when their relative paths are equal, so a set of entries
/// holds at most one record per file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileEntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_hash: Option<String>,
    #[serde(default = "unknown")]
    pub last_modified: i64,
    #[serde(default = "unknown")]
    pub size: i64,
}

fn unknown() -> i64 {
    UNKNOWN
}

impl FileEntry {
    /// Entry for a file that appeared since the comparison snapshot.
    pub fn added(
        path: impl Into<String>,
        new_hash: impl Into<String>,
        last_modified: i64,
        size: i64,
    ) -> Self {
        Self {
            path: path.into(),
            kind: FileEntryType::Added,
            old_hash: None,
            new_hash: Some(new_hash.into()),
            last_modified,
            size,
        }
    }

    /// Entry for a file whose content hash differs from the comparison snapshot.
    pub fn changed(
        path: impl Into<String>,
        old_hash: impl Into<String>,
        new_hash: impl Into<String>,
        last_modified: i64,
        size: i64,
    ) -> Self {
        Self {
            path: path.into(),
            kind: FileEntryType::Changed,
            old_hash: Some(old_hash.into()),
            new_hash: Some(new_hash.into()),
            last_modified,
            size,
        }
    }

    /// Entry for a file that is gone or no longer readable.
    pub fn removed(path: impl Into<String>, old_hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: FileEntryType::Removed,
            old_hash: Some(old_hash.into()),
            new_hash: None,
            last_modified: UNKNOWN,
            size: UNKNOWN,
        }
    }

    /// Hash of the content this entry describes as present.
    ///
    /// Coverage snapshots only hold added or changed entries, so this is the
    /// stored hash a detection cycle compares against.
    pub fn current_hash(&self) -> Option<&str> {
        self.new_hash.as_deref()
    }

    /// True when the cached timestamp and size are both known.
    pub fn has_cached_metadata(&self) -> bool {
        self.last_modified != UNKNOWN && self.size != UNKNOWN
    }

    /// True when the hashes relevant to this entry's type match `other`'s.
    pub(crate) fn same_drift(&self, other: &FileEntry) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            FileEntryType::Added => self.new_hash == other.new_hash,
            FileEntryType::Changed => {
                self.new_hash == other.new_hash && self.old_hash == other.old_hash
            }
            FileEntryType::Removed => self.old_hash == other.old_hash,
        }
    }
}

impl PartialEq for FileEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for FileEntry {}

impl Hash for FileEntry {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn constructors_carry_only_the_relevant_hashes() {
        let added = FileEntry::added("a.txt", "h1", 10, 3);
        assert_eq!(added.old_hash, None);
        assert_eq!(added.new_hash.as_deref(), Some("h1"));

        let changed = FileEntry::changed("a.txt", "h1", "h2", 11, 4);
        assert_eq!(changed.old_hash.as_deref(), Some("h1"));
        assert_eq!(changed.new_hash.as_deref(), Some("h2"));

        let removed = FileEntry::removed("a.txt", "h2");
        assert_eq!(removed.old_hash.as_deref(), Some("h2"));
        assert_eq!(removed.new_hash, None);
        assert!(!removed.has_cached_metadata());
    }

    #[test]
    fn entries_are_keyed_by_path() {
        let mut set = HashSet::new();
        set.insert(FileEntry::added("a.txt", "h1", 1, 1));
        set.insert(FileEntry::changed("a.txt", "h1", "h2", 2, 2));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn same_drift_compares_hashes_by_type() {
        let removed = FileEntry::removed("a", "h1");
        assert!(removed.same_drift(&FileEntry::removed("a", "h1")));
        assert!(!removed.same_drift(&FileEntry::removed("a", "h2")));
        assert!(!removed.same_drift(&FileEntry::added("a", "h1", 0, 0)));

        let changed = FileEntry::changed("a", "h1", "h2", 5, 5);
        assert!(changed.same_drift(&FileEntry::changed("a", "h1", "h2", 9, 9)));
        assert!(!changed.same_drift(&FileEntry::changed("a", "h0", "h2", 5, 5)));
    }

    #[test]
    fn serialized_form_uses_type_letters_and_defaults_unknown_metadata() {
        let json = serde_json::to_string(&FileEntry::removed("conf/a.xml", "abc")).unwrap();
        assert!(json.contains("\"type\":\"R\""));
        assert!(!json.contains("new_hash"));

        let parsed: FileEntry =
            serde_json::from_str(r#"{"path":"b","type":"A","new_hash":"ff"}"#).unwrap();
        assert_eq!(parsed.last_modified, UNKNOWN);
        assert_eq!(parsed.size, UNKNOWN);
    }
}
