//! Administrative reset use case
//!
//! Exposes the bulk "reset all to Local" and "retry now" actions to callers
//! outside the sync engine. Both are plain store mutations and are safe to
//! run while a sync pass is in flight: a record reset under a running
//! attempt rejects that attempt's late write.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::ports::{BulkMutation, RecordFilter, RecordStore};

/// Use case for administrative bulk resets
pub struct ResetRecordsUseCase {
    store: Arc<dyn RecordStore>,
}

impl ResetRecordsUseCase {
    /// Creates a new ResetRecordsUseCase
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Resets every record to a fresh `Local`, dropping locators and backoff
    ///
    /// Returns the number of records reset.
    #[tracing::instrument(skip(self))]
    pub async fn reset_all(&self) -> Result<u64> {
        let count = self
            .store
            .bulk_mutate(&RecordFilter::new(), BulkMutation::ResetToLocal)
            .await
            .context("Failed to reset records to local")?;
        tracing::info!(count, "Reset all records to local");
        Ok(count)
    }

    /// Makes every `Local` record eligible immediately, keeping failure counts
    ///
    /// Returns the number of records whose backoff was cleared.
    #[tracing::instrument(skip(self))]
    pub async fn retry_now(&self) -> Result<u64> {
        let count = self
            .store
            .bulk_mutate(&RecordFilter::new(), BulkMutation::ClearBackoff)
            .await
            .context("Failed to clear retry backoff")?;
        tracing::info!(count, "Cleared retry backoff");
        Ok(count)
    }
}
