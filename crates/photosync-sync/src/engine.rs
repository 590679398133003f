//! Reconciliation pass
//!
//! The [`SyncEngine`] owns the collaborators of one reconciliation loop and
//! runs a single pass on demand. Scheduling lives in
//! [`SyncScheduler`](crate::scheduler::SyncScheduler).
//!
//! ## Pass Flow
//!
//! 1. **Orphan release**: records still `Syncing` are returned to `Local`.
//!    No task is in flight between passes, so any of them is left over from
//!    a crash or a halted batch.
//! 2. **Selection**: the oldest due `Local` records, up to the batch size.
//! 3. **Execution**: the [`WorkerPool`] runs one task per record.
//! 4. **Bookkeeping**: per-status gauges are refreshed.
//!
//! An empty selection ends the pass without touching the pool.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use photosync_core::domain::SyncStatus;
use photosync_core::ports::{AssetProvider, BulkMutation, RecordFilter, RecordStore, Uploader};

use crate::config::EngineConfig;
use crate::events::{self, publish, EngineEvent};
use crate::metrics::EngineMetrics;
use crate::pool::{BatchReport, WorkerPool};
use crate::retry::with_store_retry;
use crate::selector::BatchSelector;
use crate::staging::PayloadMaterializer;
use crate::task::TaskContext;
use crate::SyncError;

/// Runs reconciliation passes against one record store
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    selector: BatchSelector,
    pool: WorkerPool,
    config: EngineConfig,
    events: broadcast::Sender<EngineEvent>,
    metrics: Arc<EngineMetrics>,
}

impl SyncEngine {
    /// Creates an engine with its own event channel and metrics registry
    pub fn new(
        store: Arc<dyn RecordStore>,
        assets: Arc<dyn AssetProvider>,
        uploader: Arc<dyn Uploader>,
        config: EngineConfig,
    ) -> anyhow::Result<Self> {
        let metrics = Arc::new(EngineMetrics::new()?);
        let events = events::channel();
        let materializer = PayloadMaterializer::new(assets, config.staging_dir.clone());
        let ctx = Arc::new(TaskContext::new(
            store.clone(),
            materializer,
            uploader,
            config.clone(),
            events.clone(),
            metrics.clone(),
        ));

        info!(
            batch_size = config.batch_size,
            max_concurrent_uploads = config.max_concurrent_uploads,
            staging_dir = %config.staging_dir.display(),
            "Creating sync engine"
        );

        Ok(Self {
            selector: BatchSelector::new(store.clone(), config.batch_size),
            pool: WorkerPool::new(ctx, config.max_concurrent_uploads),
            store,
            config,
            events,
            metrics,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    /// Subscribes to engine events
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &broadcast::Sender<EngineEvent> {
        &self.events
    }

    /// Number of records still waiting to be synced, due or not
    pub async fn pending_count(&self) -> Result<u64, SyncError> {
        let store = self.store.as_ref();
        with_store_retry("count_local", self.config.store_attempts, move || {
            store.count_by_status(SyncStatus::Local)
        })
        .await
    }

    /// Runs one pass
    ///
    /// Returns `None` when no record was due, without issuing a batch.
    ///
    /// # Errors
    ///
    /// `SyncError::StoreUnavailable` if orphan release or selection keeps
    /// failing. Per-record failures are reported in the [`BatchReport`].
    #[tracing::instrument(skip_all)]
    pub async fn run_pass(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<BatchReport>, SyncError> {
        let store = self.store.as_ref();
        let attempts = self.config.store_attempts;

        let orphan_filter = RecordFilter::new().with_status(SyncStatus::Syncing);
        let released = with_store_retry("release_orphans", attempts, || {
            store.bulk_mutate(&orphan_filter, BulkMutation::ReleaseOrphaned)
        })
        .await?;
        if released > 0 {
            warn!(released, "Released orphaned Syncing records");
        }

        let selector = &self.selector;
        let batch = with_store_retry("select_batch", attempts, || selector.select_batch()).await?;
        if batch.is_empty() {
            debug!("No due records, skipping pass");
            return Ok(None);
        }

        let size = batch.len();
        info!(batch = size, "Starting pass");
        self.metrics.record_pass();
        publish(&self.events, EngineEvent::PassStarted { batch: size });

        let report = self.pool.run(batch, cancel).await;

        publish(
            &self.events,
            EngineEvent::PassCompleted {
                report: report.clone(),
            },
        );
        self.refresh_gauges().await;
        Ok(Some(report))
    }

    async fn refresh_gauges(&self) {
        match self.store.count_by_status_all().await {
            Ok(counts) => {
                for (status, count) in counts {
                    self.metrics.set_records(status, count);
                }
            }
            Err(e) => debug!(error = %e, "Could not refresh record gauges"),
        }
    }
}
