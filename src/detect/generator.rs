use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use tracing::{debug, info, info_span, warn};

use crate::changeset::{
    Category, ChangeSetStore, FileEntry, Headers, delta_path_beside, pinned_snapshot_path,
    previous_snapshot_path, write_all,
};
use crate::config::{DriftDefinition, DriftDetectionSchedule};
use crate::facet::FileStatus;

use super::classify::{Classification, FileProbe, classify};
use super::strategy::DetectionStrategy;
use super::summary::DetectionSummary;
use super::DetectionError;

/// Produces coverage snapshots and delta changesets for one schedule.
///
/// The generator owns no state between cycles; everything it knows about
/// earlier cycles is read back from the changeset store.
pub struct SnapshotGenerator<'a> {
    store: &'a dyn ChangeSetStore,
    strategy: &'a dyn DetectionStrategy,
}

impl<'a> SnapshotGenerator<'a> {
    pub fn new(store: &'a dyn ChangeSetStore, strategy: &'a dyn DetectionStrategy) -> Self {
        Self { store, strategy }
    }

    /// Write the first coverage snapshot (version 0) for a schedule.
    ///
    /// Fails with [`DetectionError::SnapshotExists`] once a lineage exists;
    /// later cycles go through [`Self::generate_drift_changeset`]. An invalid base directory is reported through
    /// [`DetectionSummary::base_dir_exists`] and produces nothing.
    pub fn generate_snapshot(
        &self,
        schedule: &DriftDetectionSchedule,
        base_dir: &Path,
    ) -> Result<DetectionSummary, DetectionError> {
        let definition = &schedule.definition;
        let _span = info_span!(
            "snapshot",
            resource_id = schedule.resource_id,
            definition = %definition.name
        )
        .entered();
        let coverage =
            self.store
                .find_changeset(schedule.resource_id, &definition.name, Category::Coverage)?;
        if self.store.exists(&coverage) {
            return Err(DetectionError::SnapshotExists { path: coverage });
        }
        let mut summary = DetectionSummary::new(schedule.clone());
        if !self.strategy.is_base_dir_valid(base_dir) {
            warn!(
                base_dir = %base_dir.display(),
                "Base directory does not exist; review the drift definition's base directory"
            );
            summary.base_dir_exists = false;
            return Ok(summary);
        }

        debug!("Generating coverage changeset");
        let mut writer = self
            .store
            .writer(&coverage, headers(schedule, base_dir, Category::Coverage, 0))?;
        for info in self.strategy.all_files(base_dir, definition)? {
            let hash = match info.hash {
                Some(hash) => hash,
                None => match self.strategy.sha256(base_dir, &info.path) {
                    Ok(hash) => hash,
                    Err(err) if err.is_per_file() => {
                        warn!(path = %info.path, error = %err, "Failed to hash file, skipping");
                        continue;
                    }
                    Err(err) => return Err(err),
                },
            };
            writer.write(&FileEntry::added(
                info.path,
                hash,
                info.last_modified,
                info.size,
            ))?;
            summary.added += 1;
        }
        writer.close()?;

        if definition.pinned {
            self.store.copy(&coverage, &pinned_snapshot_path(&coverage))?;
        }
        info!(files = summary.added, "Wrote coverage snapshot version 0");
        summary.new_snapshot = Some(coverage);
        Ok(summary)
    }

    /// Compare the current files against the last snapshot and record any drift.
    ///
    /// Pinned definitions compare against the pinned baseline; the version
    /// always follows the live coverage snapshot.
    pub fn generate_drift_changeset(
        &self,
        schedule: &DriftDetectionSchedule,
        base_dir: &Path,
    ) -> Result<DetectionSummary, DetectionError> {
        let definition = &schedule.definition;
        let _span = info_span!(
            "drift",
            resource_id = schedule.resource_id,
            definition = %definition.name
        )
        .entered();
        let pinned = definition.pinned;
        let mut summary = DetectionSummary::new(schedule.clone());

        let coverage =
            self.store
                .find_changeset(schedule.resource_id, &definition.name, Category::Coverage)?;
        let comparison = if pinned {
            pinned_snapshot_path(&coverage)
        } else {
            coverage.clone()
        };
        if pinned && !self.store.exists(&comparison) {
            info!("Definition is pinned but has no baseline yet; pinning the current snapshot");
            self.store.copy(&coverage, &comparison)?;
        }
        if !self.strategy.is_base_dir_valid(base_dir) {
            warn!(base_dir = %base_dir.display(), "Base directory does not exist");
            summary.base_dir_exists = false;
        }

        debug!(snapshot = %comparison.display(), "Generating drift changeset");
        let snapshot = self.store.reader(&comparison)?;
        let current_version = if pinned {
            self.store.reader(&coverage)?.headers().version
        } else {
            snapshot.headers().version
        };
        let new_version = current_version.saturating_add(1);

        let classification = {
            let listing = self.strategy.all_files(base_dir, definition)?;
            let mut probe = StrategyProbe {
                strategy: self.strategy,
                definition,
                base_dir,
            };
            classify(snapshot, listing, &mut probe, pinned)?
        };
        summary.added = classification.added.len();
        summary.changed = classification.changed.len();
        summary.removed = classification.removed.len();

        if pinned && (classification.backfilled || classification.has_drift()) {
            write_all(
                self.store,
                &comparison,
                headers(schedule, base_dir, Category::Coverage, 0),
                classification.pinned_entries(),
            )?;
        }

        if !classification.has_drift() {
            summary.version = current_version;
            if !pinned {
                if classification.backfilled {
                    write_all(
                        self.store,
                        &coverage,
                        headers(schedule, base_dir, Category::Coverage, current_version),
                        classification.snapshot_entries(),
                    )?;
                    debug!("Refreshed cached file metadata in coverage snapshot");
                }
            } else if new_version > 1 && !self.previous_delta_empty(schedule)? {
                info!(version = new_version, "Returned to pinned baseline");
                self.write_cycle(schedule, base_dir, &coverage, &classification, new_version, &mut summary)?;
            }
            summary.new_snapshot = Some(coverage);
            return Ok(summary);
        }

        if pinned && new_version > 1 && self.same_as_previous_delta(&coverage, &classification)? {
            info!(
                version = current_version,
                "Drift from pinned baseline is unchanged since the previous detection"
            );
            summary.version = current_version;
            summary.repeat = true;
            return Ok(summary);
        }

        self.write_cycle(schedule, base_dir, &coverage, &classification, new_version, &mut summary)?;
        info!(
            version = new_version,
            added = summary.added,
            changed = summary.changed,
            removed = summary.removed,
            "Detected drift"
        );
        Ok(summary)
    }

    /// Back up the live snapshot, then publish the delta and the new snapshot.
    fn write_cycle(
        &self,
        schedule: &DriftDetectionSchedule,
        base_dir: &Path,
        coverage: &Path,
        classification: &Classification,
        version: u32,
        summary: &mut DetectionSummary,
    ) -> Result<(), DetectionError> {
        let old_snapshot = self.backup(coverage)?;
        let delta = self.store.find_changeset(
            schedule.resource_id,
            &schedule.definition.name,
            Category::Drift,
        )?;
        write_all(
            self.store,
            &delta,
            headers(schedule, base_dir, Category::Drift, version),
            classification.delta_entries(),
        )?;
        write_all(
            self.store,
            coverage,
            headers(schedule, base_dir, Category::Coverage, version),
            classification.snapshot_entries(),
        )?;
        summary.old_snapshot = Some(old_snapshot);
        summary.new_snapshot = Some(coverage.to_path_buf());
        summary.drift_changeset = Some(delta);
        summary.version = version;
        Ok(())
    }

    fn backup(&self, coverage: &Path) -> Result<PathBuf, DetectionError> {
        let previous = previous_snapshot_path(coverage);
        self.store.copy(coverage, &previous)?;
        Ok(previous)
    }

    fn previous_delta_empty(&self, schedule: &DriftDetectionSchedule) -> Result<bool, DetectionError> {
        let delta = self.store.find_changeset(
            schedule.resource_id,
            &schedule.definition.name,
            Category::Drift,
        )?;
        if !self.store.exists(&delta) {
            return Ok(true);
        }
        let mut reader = self.store.reader(&delta)?;
        match reader.next() {
            None => Ok(true),
            Some(entry) => {
                entry?;
                Ok(false)
            }
        }
    }

    /// Whether the delta just computed matches the most recent delta on disk.
    fn same_as_previous_delta(
        &self,
        coverage: &Path,
        classification: &Classification,
    ) -> Result<bool, DetectionError> {
        let delta = delta_path_beside(coverage);
        if !self.store.exists(&delta) {
            return Ok(false);
        }
        let current: HashMap<&str, &FileEntry> = classification
            .delta_entries()
            .map(|entry| (entry.path.as_str(), entry))
            .collect();
        let mut matched = 0;
        for previous in self.store.reader(&delta)? {
            let previous = previous?;
            match current.get(previous.path.as_str()) {
                Some(entry) if entry.same_drift(&previous) => matched += 1,
                _ => return Ok(false),
            }
        }
        Ok(matched == current.len())
    }
}

fn headers(
    schedule: &DriftDetectionSchedule,
    base_dir: &Path,
    category: Category,
    version: u32,
) -> Headers {
    Headers {
        resource_id: schedule.resource_id,
        definition_id: schedule.definition.id,
        definition_name: schedule.definition.name.clone(),
        base_dir: base_dir.display().to_string(),
        category,
        version,
    }
}

struct StrategyProbe<'a> {
    strategy: &'a dyn DetectionStrategy,
    definition: &'a DriftDefinition,
    base_dir: &'a Path,
}

impl FileProbe for StrategyProbe<'_> {
    fn status(&mut self, path: &str) -> Result<FileStatus, DetectionError> {
        self.strategy
            .file_status(self.definition, self.base_dir, path)
    }

    fn sha256(&mut self, path: &str) -> Result<String, DetectionError> {
        self.strategy.sha256(self.base_dir, path)
    }
}
