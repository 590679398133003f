//! Library ingestion use case
//!
//! Pages through the local media library and creates a `Local` record for
//! every asset the store has not seen before. Existing records are never
//! touched, so running the ingestion repeatedly is safe.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::domain::SyncRecord;
use crate::ports::{AssetProvider, RecordStore};

/// Default number of assets requested per page
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Outcome of one ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Assets listed by the library
    pub scanned: u64,
    /// Records newly created
    pub inserted: u64,
    /// Assets skipped because their creation date is unknown
    pub skipped: u64,
}

/// Use case for mirroring the library's asset list into the record store
pub struct IngestAssetsUseCase {
    assets: Arc<dyn AssetProvider>,
    store: Arc<dyn RecordStore>,
    page_size: usize,
}

impl IngestAssetsUseCase {
    /// Creates a new IngestAssetsUseCase
    pub fn new(assets: Arc<dyn AssetProvider>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            assets,
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Overrides the page size (minimum 1)
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one full ingestion pass over the library
    ///
    /// # Errors
    ///
    /// Returns an error if listing the library or writing to the store fails.
    /// Records inserted before the failure stay inserted.
    #[tracing::instrument(skip(self))]
    pub async fn execute(&self) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        let mut offset = 0;

        loop {
            let page = self
                .assets
                .list_assets(offset, self.page_size)
                .await
                .with_context(|| format!("Failed to list assets at offset {offset}"))?;
            let page_len = page.len();

            for asset in page {
                report.scanned += 1;
                let Some(created_at) = asset.created_at else {
                    tracing::debug!(asset_id = %asset.id, "Skipping asset without creation date");
                    report.skipped += 1;
                    continue;
                };

                let record = SyncRecord::new(asset.id, created_at, asset.media_kind);
                if self
                    .store
                    .insert_if_absent(&record)
                    .await
                    .with_context(|| format!("Failed to insert record {}", record.id()))?
                {
                    report.inserted += 1;
                }
            }

            if page_len < self.page_size {
                break;
            }
            offset += page_len;
        }

        tracing::info!(
            scanned = report.scanned,
            inserted = report.inserted,
            skipped = report.skipped,
            "Library ingestion complete"
        );
        Ok(report)
    }
}
