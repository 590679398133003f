//! Batch selection
//!
//! A batch is the oldest `batch_size` records that are `Local` and due
//! (no backoff pending). Selection is a pure read of the record store.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use photosync_core::domain::{SyncRecord, SyncStatus};
use photosync_core::ports::{RecordFilter, RecordStore};

/// Carves bounded batches of eligible records
#[derive(Clone)]
pub struct BatchSelector {
    store: Arc<dyn RecordStore>,
    batch_size: u32,
}

impl BatchSelector {
    pub fn new(store: Arc<dyn RecordStore>, batch_size: u32) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Selects the next batch, oldest first
    pub async fn select_batch(&self) -> anyhow::Result<Vec<SyncRecord>> {
        self.select_batch_at(Utc::now()).await
    }

    /// Selects the next batch of records due at `now`
    pub async fn select_batch_at(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<SyncRecord>> {
        let filter = RecordFilter::new()
            .with_status(SyncStatus::Local)
            .due_at(now);
        let batch = self.store.query(&filter, Some(self.batch_size)).await?;
        debug!(selected = batch.len(), batch_size = self.batch_size, "Selected batch");
        Ok(batch)
    }
}
