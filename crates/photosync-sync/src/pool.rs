//! Bounded worker pool
//!
//! Runs one [`UploadTask`] per record of a batch. Every task is spawned up
//! front; a [`Semaphore`] with `max_concurrency` permits gates staging and
//! uploading, so at most that many tasks are in `Uploading` at any instant.
//! `run` returns only after every task reached a terminal state.
//!
//! When a task reports [`TaskOutcome::Halted`] (record store unavailable),
//! the batch-scoped cancellation token fires: tasks still waiting for a
//! permit release their claim and end as `Cancelled`, tasks already
//! uploading finish normally.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use photosync_core::domain::SyncRecord;

use crate::task::{TaskContext, TaskOutcome, UploadTask};

/// Tally of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub synced: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub halted: usize,
}

impl BatchReport {
    /// Number of tasks accounted for
    pub fn total(&self) -> usize {
        self.synced + self.failed + self.skipped + self.cancelled + self.halted
    }

    /// Returns true if the batch was cut short by a store failure
    pub fn is_halted(&self) -> bool {
        self.halted > 0
    }

    fn add(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Synced(_) => self.synced += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
            TaskOutcome::Skipped => self.skipped += 1,
            TaskOutcome::Cancelled => self.cancelled += 1,
            TaskOutcome::Halted(_) => self.halted += 1,
        }
    }
}

/// Executes upload tasks with a fixed concurrency cap
pub struct WorkerPool {
    ctx: Arc<TaskContext>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
}

impl WorkerPool {
    pub fn new(ctx: Arc<TaskContext>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            ctx,
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Runs every record of `batch` to a terminal state
    ///
    /// Cancelling `cancel` abandons tasks that have not started uploading.
    pub async fn run(&self, batch: Vec<SyncRecord>, cancel: &CancellationToken) -> BatchReport {
        let halt = cancel.child_token();
        let mut tasks = JoinSet::new();

        for record in batch {
            let task = UploadTask::new(self.ctx.clone(), record);
            tasks.spawn(task.run(self.permits.clone(), halt.clone()));
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    if let TaskOutcome::Halted(ref e) = outcome {
                        if !halt.is_cancelled() {
                            warn!(error = %e, "Record store unavailable, halting batch");
                            halt.cancel();
                        }
                    }
                    report.add(&outcome);
                }
                Err(e) => {
                    error!(error = %e, "Upload task panicked");
                    report.failed += 1;
                }
            }
        }

        info!(
            synced = report.synced,
            failed = report.failed,
            skipped = report.skipped,
            cancelled = report.cancelled,
            halted = report.halted,
            "Batch finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncError;
    use photosync_core::domain::RemoteLocator;

    #[test]
    fn test_batch_report_tallies_outcomes() {
        let mut report = BatchReport::default();
        report.add(&TaskOutcome::Synced(RemoteLocator::new("https://cdn/a").unwrap()));
        report.add(&TaskOutcome::Failed(SyncError::UploadFailure("503".into())));
        report.add(&TaskOutcome::Skipped);
        report.add(&TaskOutcome::Cancelled);

        assert_eq!(report.total(), 4);
        assert!(!report.is_halted());

        report.add(&TaskOutcome::Halted(SyncError::StoreUnavailable("locked".into())));
        assert!(report.is_halted());
    }
}
