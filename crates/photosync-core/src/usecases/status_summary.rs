//! Status summary use case

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::SyncStatus;
use crate::ports::{RecordFilter, RecordStore};

/// Per-status record counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub counts: BTreeMap<SyncStatus, u64>,
    /// `Local` records still waiting out a retry backoff
    pub backing_off: u64,
}

impl StatusSummary {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn get(&self, status: SyncStatus) -> u64 {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

/// Use case that reports how many records sit in each status
pub struct StatusSummaryUseCase {
    store: Arc<dyn RecordStore>,
}

impl StatusSummaryUseCase {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self) -> Result<StatusSummary> {
        let counts = self
            .store
            .count_by_status_all()
            .await
            .context("Failed to count records by status")?;
        let due = self
            .store
            .count(
                &RecordFilter::new()
                    .with_status(SyncStatus::Local)
                    .due_at(chrono::Utc::now()),
            )
            .await
            .context("Failed to count due records")?;
        let local = counts.get(&SyncStatus::Local).copied().unwrap_or(0);
        Ok(StatusSummary {
            counts,
            backing_off: local.saturating_sub(due),
        })
    }
}
