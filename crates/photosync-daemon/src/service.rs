//! Daemon service wiring
//!
//! [`DaemonService`] owns the record store and the shutdown token, and builds
//! the adapters and the sync engine on demand for each CLI command.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use photosync_cache::{DatabasePool, SqliteRecordStore};
use photosync_core::config::Config;
use photosync_core::ports::{AssetProvider, RecordStore};
use photosync_core::usecases::{
    IngestAssetsUseCase, IngestReport, ResetRecordsUseCase, StatusSummary, StatusSummaryUseCase,
};
use photosync_remote::HttpUploader;
use photosync_sync::{
    DirectoryAssetProvider, EngineConfig, StopMode, SyncEngine, SyncScheduler,
};

use crate::mock::{MockGenerator, MockSettings};

/// How often `run` re-scans the library for new assets
const LIBRARY_RESCAN_INTERVAL: Duration = Duration::from_secs(60);

pub struct DaemonService {
    config: Config,
    store: Arc<dyn RecordStore>,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the SQLite record store named in the configuration
    pub async fn open(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let db_pool = DatabasePool::new(&config.storage.database)
            .await
            .context("Failed to open record database")?;
        let store: Arc<dyn RecordStore> = Arc::new(SqliteRecordStore::new(db_pool.pool().clone()));
        Ok(Self::with_store(config, store, shutdown))
    }

    pub fn with_store(
        config: Config,
        store: Arc<dyn RecordStore>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            store,
            shutdown,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    fn assets(&self) -> Arc<dyn AssetProvider> {
        Arc::new(DirectoryAssetProvider::new(self.config.library.root.clone()))
    }

    /// Mirrors the library into the record store once
    pub async fn ingest(&self) -> Result<IngestReport> {
        IngestAssetsUseCase::new(self.assets(), self.store.clone())
            .execute()
            .await
    }

    pub async fn status(&self) -> Result<StatusSummary> {
        StatusSummaryUseCase::new(self.store.clone()).execute().await
    }

    /// Resets every record, or only clears retry backoff with `retry_only`
    pub async fn reset(&self, retry_only: bool) -> Result<u64> {
        let usecase = ResetRecordsUseCase::new(self.store.clone());
        if retry_only {
            usecase.retry_now().await
        } else {
            usecase.reset_all().await
        }
    }

    /// Runs the mock generator until the cap is reached or shutdown
    pub async fn mock(&self, settings: MockSettings) -> Result<u64> {
        MockGenerator::new(self.store.clone(), settings)?
            .run(&self.shutdown)
            .await
    }

    /// Builds the engine from the configured adapters
    pub fn build_engine(&self) -> Result<Arc<SyncEngine>> {
        let endpoint = self
            .config
            .remote
            .endpoint
            .as_deref()
            .context("remote.endpoint is not configured")?;
        let uploader = Arc::new(HttpUploader::from_endpoint(
            endpoint,
            self.config.remote.access_token.as_deref(),
        ));

        let engine = SyncEngine::new(
            self.store.clone(),
            self.assets(),
            uploader,
            EngineConfig::from_config(&self.config),
        )
        .context("Failed to create sync engine")?;
        Ok(Arc::new(engine))
    }

    /// Runs the scheduler until the shutdown token fires
    ///
    /// 1. Ingests the library
    /// 2. Starts the scheduler
    /// 3. Re-scans the library periodically; new records wake the scheduler
    /// 4. On shutdown, cancels tasks that have not started uploading and
    ///    waits for the rest
    pub async fn run(&self) -> Result<()> {
        let engine = self.build_engine()?;

        match self.ingest().await {
            Ok(report) => info!(
                scanned = report.scanned,
                inserted = report.inserted,
                "Library ingested"
            ),
            Err(e) => warn!(error = %format!("{e:#}"), "Library ingestion failed"),
        }

        let scheduler = SyncScheduler::new(engine);
        scheduler.start();

        let mut rescan = tokio::time::interval(LIBRARY_RESCAN_INTERVAL);
        // The first tick fires immediately; the library was just ingested
        rescan.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = rescan.tick() => {
                    match self.ingest().await {
                        Ok(report) if report.inserted > 0 => {
                            info!(inserted = report.inserted, "New assets found");
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %format!("{e:#}"), "Library rescan failed"),
                    }
                }
            }
        }

        scheduler.shutdown(StopMode::Cancel).await;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
