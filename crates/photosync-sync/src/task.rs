//! Per-record upload state machine
//!
//! An [`UploadTask`] drives one record through one attempt:
//!
//! ```text
//! Created ──claim──▶ (waiting for a permit) ──▶ Staging ──▶ Uploading ──▶ Completed
//!    │                        │                    │
//!    └──── cancelled ─────────┴────────────────────┘ (release claim, no failure counted)
//! ```
//!
//! ## Design Notes
//!
//! - **Fenced writes**: the claim stamps a fresh [`AttemptId`] on the record.
//!   Every later write of this task is rejected unless the record is still
//!   `Syncing` under that attempt, so a concurrent admin reset always wins
//!   and the task's late write is dropped.
//! - **Concurrency**: the pool's permit is held from staging until the upload
//!   call returns, which bounds the number of tasks in `Uploading`.
//! - **Cancellation** is honoured until the upload starts. After that the
//!   task runs to its own terminal write, bounded by the upload timeout.
//! - `run` consumes the task, so it cannot be re-entered.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Span};

use photosync_core::domain::{AttemptId, RemoteLocator, SyncRecord};
use photosync_core::ports::{mutate, MutationOutcome, RecordStore, Uploader};

use crate::config::EngineConfig;
use crate::events::{publish, EngineEvent};
use crate::metrics::EngineMetrics;
use crate::retry::{next_attempt_at, with_store_retry};
use crate::staging::PayloadMaterializer;
use crate::SyncError;

/// Collaborators shared by every task of an engine
pub struct TaskContext {
    pub(crate) store: Arc<dyn RecordStore>,
    pub(crate) materializer: PayloadMaterializer,
    pub(crate) uploader: Arc<dyn Uploader>,
    pub(crate) config: EngineConfig,
    pub(crate) events: broadcast::Sender<EngineEvent>,
    pub(crate) metrics: Arc<EngineMetrics>,
}

impl TaskContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        materializer: PayloadMaterializer,
        uploader: Arc<dyn Uploader>,
        config: EngineConfig,
        events: broadcast::Sender<EngineEvent>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            materializer,
            uploader,
            config,
            events,
            metrics,
        }
    }
}

/// Where a task currently is, recorded on the task's span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskPhase {
    Created,
    Staging,
    Uploading,
    Completed,
}

impl TaskPhase {
    fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Created => "created",
            TaskPhase::Staging => "staging",
            TaskPhase::Uploading => "uploading",
            TaskPhase::Completed => "completed",
        }
    }
}

/// Terminal result of one task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The record is now `Synced` at this locator
    Synced(RemoteLocator),
    /// The attempt failed; the record went back to `Local` with a backoff
    Failed(SyncError),
    /// Nothing to do: the record was claimed, synced, reset or deleted elsewhere
    Skipped,
    /// Cancelled before uploading; the record is `Local` as if never attempted
    Cancelled,
    /// The record store kept failing; the batch should stop
    Halted(SyncError),
}

impl TaskOutcome {
    /// Label used for the uploads counter
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Synced(_) => "synced",
            TaskOutcome::Failed(_) => "failed",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::Cancelled => "cancelled",
            TaskOutcome::Halted(_) => "halted",
        }
    }
}

/// One attempt to sync one record
pub struct UploadTask {
    ctx: Arc<TaskContext>,
    record: SyncRecord,
    attempt: AttemptId,
    phase: TaskPhase,
}

impl UploadTask {
    pub fn new(ctx: Arc<TaskContext>, record: SyncRecord) -> Self {
        Self {
            ctx,
            record,
            attempt: AttemptId::new(),
            phase: TaskPhase::Created,
        }
    }

    pub fn attempt(&self) -> AttemptId {
        self.attempt
    }

    /// Runs the attempt to a terminal state
    ///
    /// `permits` bounds how many tasks stage and upload at once; `cancel`
    /// abandons the attempt if it fires before the upload starts.
    #[tracing::instrument(
        skip_all,
        fields(record_id = %self.record.id(), attempt = %self.attempt, phase = TaskPhase::Created.as_str())
    )]
    pub async fn run(mut self, permits: Arc<Semaphore>, cancel: CancellationToken) -> TaskOutcome {
        let outcome = self.drive(permits, cancel).await;
        self.enter(TaskPhase::Completed);
        debug!(outcome = outcome.label(), "Task finished");
        self.ctx.metrics.record_upload(outcome.label());
        outcome
    }

    fn enter(&mut self, phase: TaskPhase) {
        debug!(from = self.phase.as_str(), to = phase.as_str(), "Task phase change");
        self.phase = phase;
        Span::current().record("phase", phase.as_str());
    }

    async fn drive(&mut self, permits: Arc<Semaphore>, cancel: CancellationToken) -> TaskOutcome {
        if cancel.is_cancelled() {
            return TaskOutcome::Cancelled;
        }

        match self.claim().await {
            Ok(true) => {}
            Ok(false) => return TaskOutcome::Skipped,
            Err(e) => return TaskOutcome::Halted(e),
        }

        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abandon().await,
            permit = permits.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return self.abandon().await,
            },
        };

        self.enter(TaskPhase::Staging);
        let staged = match self.ctx.materializer.materialize(&self.record).await {
            Ok(staged) => staged,
            Err(e) => return self.fail(e).await,
        };
        if cancel.is_cancelled() {
            drop(staged);
            return self.abandon().await;
        }

        self.enter(TaskPhase::Uploading);
        let started = Instant::now();
        let timeout = self.ctx.config.upload_timeout;
        let result = match tokio::time::timeout(timeout, self.ctx.uploader.upload(&staged)).await {
            Ok(Ok(locator)) => Ok(locator),
            Ok(Err(e)) => Err(SyncError::UploadFailure(format!("{e:#}"))),
            Err(_) => Err(SyncError::UploadFailure(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            ))),
        };
        let elapsed = started.elapsed().as_secs_f64();
        let size = staged.size_bytes();
        drop(staged);

        match result {
            Ok(locator) => {
                self.ctx.metrics.observe_upload_duration("synced", elapsed);
                self.ctx.metrics.record_bytes(size);
                self.complete(locator).await
            }
            Err(e) => {
                self.ctx.metrics.observe_upload_duration("failed", elapsed);
                self.fail(e).await
            }
        }
    }

    /// Marks the record `Syncing` under this attempt
    ///
    /// Returns false if the record is no longer claimable.
    async fn claim(&mut self) -> Result<bool, SyncError> {
        let store = self.ctx.store.as_ref();
        let id = self.record.id();
        let attempt = self.attempt;

        let outcome = with_store_retry("claim", self.ctx.config.store_attempts, move || {
            mutate(store, id, move |r| r.begin_sync(attempt))
        })
        .await?;

        match outcome {
            MutationOutcome::Applied(record) => {
                self.record = record;
                Ok(true)
            }
            MutationOutcome::Rejected(e) => {
                debug!(error = %e, "Record no longer claimable, skipping");
                Ok(false)
            }
            MutationOutcome::NotFound => {
                debug!("Record disappeared before claim, skipping");
                Ok(false)
            }
        }
    }

    async fn complete(&mut self, locator: RemoteLocator) -> TaskOutcome {
        let store = self.ctx.store.as_ref();
        let id = self.record.id();
        let attempt = self.attempt;
        let target = &locator;

        let outcome = with_store_retry("complete", self.ctx.config.store_attempts, move || {
            mutate(store, id, move |r| r.complete_sync(attempt, target.clone()))
        })
        .await;

        match outcome {
            Ok(MutationOutcome::Applied(_)) => {
                info!(locator = %locator, "Record synced");
                publish(
                    &self.ctx.events,
                    EngineEvent::RecordSynced {
                        id: id.clone(),
                        locator: locator.clone(),
                    },
                );
                TaskOutcome::Synced(locator)
            }
            Ok(MutationOutcome::Rejected(e)) => {
                debug!(error = %e, "Record changed during upload, dropping late write");
                TaskOutcome::Skipped
            }
            Ok(MutationOutcome::NotFound) => {
                debug!("Record deleted during upload, dropping late write");
                TaskOutcome::Skipped
            }
            Err(e) => TaskOutcome::Halted(e),
        }
    }

    async fn fail(&mut self, error: SyncError) -> TaskOutcome {
        let store = self.ctx.store.as_ref();
        let id = self.record.id();
        let attempt = self.attempt;
        let config = &self.ctx.config;
        let next_at = next_attempt_at(
            Utc::now(),
            self.record.failed_attempts().saturating_add(1),
            config.retry_base_delay,
            config.retry_max_delay,
        );
        let message = error.to_string();
        let reason = message.as_str();

        let outcome = with_store_retry("fail", config.store_attempts, move || {
            mutate(store, id, move |r| r.fail_sync(attempt, reason, next_at))
        })
        .await;

        warn!(
            error = %error,
            kind = error.kind(),
            next_attempt_at = %next_at,
            "Record sync failed"
        );
        publish(
            &self.ctx.events,
            EngineEvent::RecordFailed {
                id: id.clone(),
                error: message.clone(),
            },
        );

        match outcome {
            Ok(MutationOutcome::Applied(_)) => TaskOutcome::Failed(error),
            Ok(MutationOutcome::Rejected(e)) => {
                debug!(error = %e, "Record changed during attempt, failure not recorded");
                TaskOutcome::Failed(error)
            }
            Ok(MutationOutcome::NotFound) => TaskOutcome::Failed(error),
            Err(e) => TaskOutcome::Halted(e),
        }
    }

    /// Gives the claim back without counting a failure
    async fn abandon(&mut self) -> TaskOutcome {
        let store = self.ctx.store.as_ref();
        let id = self.record.id();
        let attempt = self.attempt;

        let outcome = with_store_retry("release", self.ctx.config.store_attempts, move || {
            mutate(store, id, move |r| r.release(attempt))
        })
        .await;

        match outcome {
            Ok(_) => {
                debug!("Attempt cancelled before upload");
                TaskOutcome::Cancelled
            }
            Err(e) => TaskOutcome::Halted(e),
        }
    }
}
