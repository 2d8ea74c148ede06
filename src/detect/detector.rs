use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::changeset::{Category, ChangeSetStore};
use crate::config::DriftDetectionSchedule;
use crate::facet::{DEFAULT_LOCK_TIMEOUT, LockedFacet, ResourceLocks};

use super::facet_strategy::FacetStrategy;
use super::filesystem::FileSystemStrategy;
use super::generator::SnapshotGenerator;
use super::locator::ResourceLocator;
use super::strategy::DetectionStrategy;
use super::summary::DetectionSummary;
use super::DetectionError;

/// Pick the strategy for a resource: its facet when it exposes one, the local
/// filesystem otherwise.
pub fn strategy_for(
    locator: &dyn ResourceLocator,
    locks: &ResourceLocks,
    resource_id: i32,
    lock_timeout: Duration,
) -> Box<dyn DetectionStrategy> {
    match locator.facet(resource_id) {
        Some(facet) => Box::new(FacetStrategy::new(LockedFacet::new(
            facet,
            locks.lock_for(resource_id),
            lock_timeout,
        ))),
        None => Box::new(FileSystemStrategy::new()),
    }
}

/// Runs detection cycles for schedules handed in by the scheduler.
pub struct DriftDetector {
    store: Arc<dyn ChangeSetStore>,
    locator: Arc<dyn ResourceLocator>,
    locks: Arc<ResourceLocks>,
    lock_timeout: Duration,
}

impl DriftDetector {
    pub fn new(store: Arc<dyn ChangeSetStore>, locator: Arc<dyn ResourceLocator>) -> Self {
        Self {
            store,
            locator,
            locks: Arc::new(ResourceLocks::new()),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Share resource locks with other agent components.
    pub fn with_locks(mut self, locks: Arc<ResourceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<dyn ChangeSetStore> {
        &self.store
    }

    pub fn locator(&self) -> &Arc<dyn ResourceLocator> {
        &self.locator
    }

    pub fn locks(&self) -> &Arc<ResourceLocks> {
        &self.locks
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn strategy_for(&self, resource_id: i32) -> Box<dyn DetectionStrategy> {
        strategy_for(
            self.locator.as_ref(),
            &self.locks,
            resource_id,
            self.lock_timeout,
        )
    }

    /// Run one cycle: the first coverage snapshot if none exists yet, a drift
    /// changeset otherwise.
    ///
    /// Failures are logged with the schedule's identity and returned so the
    /// scheduler can treat them as transient.
    pub fn detect(
        &self,
        schedule: &DriftDetectionSchedule,
    ) -> Result<DetectionSummary, DetectionError> {
        let result = self.run_cycle(schedule);
        match &result {
            Ok(summary) if !summary.base_dir_exists => {}
            Ok(summary) => info!(
                resource_id = schedule.resource_id,
                definition = %schedule.definition.name,
                version = summary.version,
                repeat = summary.repeat,
                upload_due = summary.upload_due(),
                "Drift detection finished"
            ),
            Err(err) => error!(
                resource_id = schedule.resource_id,
                definition = %schedule.definition.name,
                error = %err,
                "Drift detection failed for {schedule}"
            ),
        }
        result
    }

    /// Forget everything stored for a schedule that is no longer run.
    pub fn unschedule(&self, schedule: &DriftDetectionSchedule) -> Result<(), DetectionError> {
        self.store
            .delete_changesets(schedule.resource_id, &schedule.definition.name)?;
        info!(
            resource_id = schedule.resource_id,
            definition = %schedule.definition.name,
            "Removed changesets for unscheduled definition"
        );
        Ok(())
    }

    fn run_cycle(
        &self,
        schedule: &DriftDetectionSchedule,
    ) -> Result<DetectionSummary, DetectionError> {
        let definition = &schedule.definition;
        let base_dir = self
            .locator
            .base_directory(schedule.resource_id, definition)?;
        let strategy = self.strategy_for(schedule.resource_id);
        let generator = SnapshotGenerator::new(self.store.as_ref(), strategy.as_ref());
        let coverage =
            self.store
                .find_changeset(schedule.resource_id, &definition.name, Category::Coverage)?;
        if self.store.exists(&coverage) {
            generator.generate_drift_changeset(schedule, &base_dir)
        } else {
            generator.generate_snapshot(schedule, &base_dir)
        }
    }
}
