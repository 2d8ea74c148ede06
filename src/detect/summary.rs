use std::path::PathBuf;

use crate::config::DriftDetectionSchedule;

/// What one detection cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionSummary {
    pub schedule: DriftDetectionSchedule,
    /// False when the base directory could not be scanned.
    pub base_dir_exists: bool,
    /// Coverage snapshot written or kept by this cycle.
    pub new_snapshot: Option<PathBuf>,
    /// Backup of the coverage snapshot this cycle replaced.
    pub old_snapshot: Option<PathBuf>,
    /// Delta changeset written by this cycle.
    pub drift_changeset: Option<PathBuf>,
    /// Version of the live coverage snapshot after the cycle.
    pub version: u32,
    /// The drift is identical to the previous delta of a pinned definition.
    pub repeat: bool,
    pub added: usize,
    pub changed: usize,
    pub removed: usize,
}

impl DetectionSummary {
    pub fn new(schedule: DriftDetectionSchedule) -> Self {
        Self {
            schedule,
            base_dir_exists: true,
            new_snapshot: None,
            old_snapshot: None,
            drift_changeset: None,
            version: 0,
            repeat: false,
            added: 0,
            changed: 0,
            removed: 0,
        }
    }

    /// A new delta was written that introduces content the collector has not seen.
    pub fn upload_due(&self) -> bool {
        !self.repeat && self.drift_changeset.is_some() && self.added + self.changed > 0
    }
}
