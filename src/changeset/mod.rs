//! Changeset data model and storage.
//!
//! A changeset is a header record followed by file entries. Coverage
//! changesets enumerate every tracked file; drift changesets hold the delta
//! between two coverage snapshots. The detection core only talks to the
//! [`ChangeSetStore`] trait; [`DirChangeSetStore`] is the on-disk layout the
//! agent binary uses.

mod dir_store;
mod entry;
mod errors;
mod fs_ops;
mod headers;
mod store;

pub use dir_store::DirChangeSetStore;
pub use entry::{FileEntry, FileEntryType, UNKNOWN};
pub use errors::ChangeSetError;
pub use headers::{Category, Headers};
pub use store::{
    COVERAGE_FILE, ChangeSetReader, ChangeSetStore, ChangeSetWriter, DRIFT_FILE,
    PINNED_SNAPSHOT_FILE, PREVIOUS_SUFFIX, delta_path_beside, pinned_snapshot_path,
    previous_snapshot_path, read_all, write_all,
};
