use serde::{Deserialize, Serialize};

use crate::changeset::UNKNOWN;

/// Path plus the cheap metadata used to decide whether a file needs hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileInfo {
    /// Path relative to the base directory, `/`-separated.
    pub path: String,
    pub last_modified: i64,
    pub size: i64,
    /// Content hash when the lister already knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, last_modified: i64, size: i64) -> Self {
        Self {
            path: path.into(),
            last_modified,
            size,
            hash: None,
        }
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }
}

/// Point-in-time status of a single known file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub path: String,
    pub exists: bool,
    pub readable: bool,
    pub last_modified: i64,
    pub size: i64,
}

impl FileStatus {
    /// Status for a path that no longer exists.
    pub fn missing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            exists: false,
            readable: false,
            last_modified: UNKNOWN,
            size: UNKNOWN,
        }
    }

    /// Status for a present, readable file.
    pub fn present(path: impl Into<String>, last_modified: i64, size: i64) -> Self {
        Self {
            path: path.into(),
            exists: true,
            readable: true,
            last_modified,
            size,
        }
    }

    /// Whether the file can take part in a comparison.
    pub fn is_available(&self) -> bool {
        self.exists && self.readable
    }
}

/// How a facet classifies a reported file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCategory {
    FileAdded,
    FileChanged,
    FileRemoved,
}

/// Content descriptor attached to a facet-reported drift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    pub size: i64,
    pub last_modified: i64,
}

/// One file as reported by a facet's snapshot listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drift {
    pub path: String,
    pub category: DriftCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_file: Option<DriftFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_file: Option<DriftFile>,
}

impl Drift {
    /// A file the facet reports as currently present.
    pub fn present(path: impl Into<String>, file: DriftFile) -> Self {
        Self {
            path: path.into(),
            category: DriftCategory::FileAdded,
            old_file: None,
            new_file: Some(file),
        }
    }

    /// Listing entry for a present file, or `None` for removals.
    pub fn into_file_info(self) -> Option<FileInfo> {
        if self.category == DriftCategory::FileRemoved {
            return None;
        }
        let file = self.new_file;
        Some(FileInfo {
            path: self.path,
            last_modified: file.as_ref().map_or(UNKNOWN, |file| file.last_modified),
            size: file.as_ref().map_or(UNKNOWN, |file| file.size),
            hash: file.and_then(|file| file.hash),
        })
    }
}

impl PartialEq for Drift {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Drift {}

impl std::hash::Hash for Drift {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_drifts_are_not_listed() {
        let drift = Drift {
            path: "gone.xml".into(),
            category: DriftCategory::FileRemoved,
            old_file: None,
            new_file: None,
        };
        assert!(drift.into_file_info().is_none());
    }

    #[test]
    fn present_drift_carries_metadata_and_hash() {
        let drift = Drift::present(
            "conf/a.xml",
            DriftFile {
                hash: Some("abc".into()),
                size: 12,
                last_modified: 99,
            },
        );
        let info = drift.into_file_info().unwrap();
        assert_eq!(info, FileInfo::new("conf/a.xml", 99, 12).with_hash("abc"));
    }
}
