//! PhotoSync Sync - Background reconciliation engine
//!
//! Provides:
//! - Batch selection of eligible records, oldest first
//! - Per-record staging and upload under a concurrency cap
//! - Fenced status transitions that survive concurrent admin resets
//! - A polling + change-notified scheduler with overlap prevention
//!
//! ## Modules
//!
//! - [`selector`] - Carves bounded batches of due `Local` records
//! - [`staging`] - Materializes payloads into the staging directory
//! - [`task`] - Per-record upload state machine
//! - [`pool`] - Bounded worker pool running one batch
//! - [`engine`] - One reconciliation pass (orphan release, select, run)
//! - [`scheduler`] - Control loop with start/stop and event-driven restart
//! - [`filesystem`] - Directory-backed asset provider

pub mod config;
pub mod engine;
pub mod events;
pub mod filesystem;
pub mod metrics;
pub mod pool;
pub mod retry;
pub mod scheduler;
pub mod selector;
pub mod staging;
pub mod task;

pub use config::EngineConfig;
pub use engine::SyncEngine;
pub use events::EngineEvent;
pub use filesystem::DirectoryAssetProvider;
pub use metrics::EngineMetrics;
pub use pool::{BatchReport, WorkerPool};
pub use scheduler::{SchedulerState, StopMode, SyncScheduler};
pub use selector::BatchSelector;
pub use staging::PayloadMaterializer;
pub use task::{TaskOutcome, UploadTask};

use thiserror::Error;

/// Errors that can occur while reconciling a record
///
/// The first three are local to one record: they send it back to `Local`
/// for a later retry and never abort the batch. `StoreUnavailable` halts
/// the current batch.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// The library no longer has the asset, or could not read it
    #[error("Asset unavailable: {0}")]
    AssetUnavailable(String),

    /// The payload could not be written to the staging area
    #[error("Staging failed: {0}")]
    StagingFailure(String),

    /// The remote transfer failed or timed out
    #[error("Upload failed: {0}")]
    UploadFailure(String),

    /// The record store kept failing after bounded retries
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(String),
}

impl SyncError {
    /// Short label used for metrics and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::AssetUnavailable(_) => "asset_unavailable",
            SyncError::StagingFailure(_) => "staging_failure",
            SyncError::UploadFailure(_) => "upload_failure",
            SyncError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
