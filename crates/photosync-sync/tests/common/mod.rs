//! Shared fakes for the engine integration tests
//!
//! - `FakeAssets`: in-memory library with per-id holes
//! - `FakeUploader`: records concurrency, fails or stalls on demand
//! - `FlakyStore`: wraps a store and fails writes while a switch is on

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{broadcast, Notify};

use photosync_cache::MemoryRecordStore;
use photosync_core::domain::{MediaKind, RecordId, RemoteLocator, SyncRecord, SyncStatus};
use photosync_core::ports::{
    AssetDescriptor, AssetProvider, BulkMutation, RecordFilter, RecordStore, StagedPayload,
    StoreChange, Uploader,
};
use photosync_sync::{EngineConfig, EngineEvent, SyncEngine};

// ============================================================================
// Records
// ============================================================================

pub fn id(s: &str) -> RecordId {
    RecordId::new(s).unwrap()
}

pub fn name(i: usize) -> String {
    format!("asset-{i:05}")
}

fn origin() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Inserts `count` Local records, one second apart, oldest first by index
pub async fn seed(store: &dyn RecordStore, count: usize) {
    for i in 0..count {
        let record = SyncRecord::new(
            id(&name(i)),
            origin() + chrono::Duration::seconds(i as i64),
            MediaKind::Image,
        );
        assert!(store.insert_if_absent(&record).await.unwrap());
    }
}

pub async fn count(store: &dyn RecordStore, status: SyncStatus) -> u64 {
    store.count_by_status(status).await.unwrap()
}

pub async fn get(store: &dyn RecordStore, name: &str) -> SyncRecord {
    store.get(&id(name)).await.unwrap().unwrap()
}

// ============================================================================
// Asset provider
// ============================================================================

/// Library holding every id except the ones marked missing
#[derive(Default)]
pub struct FakeAssets {
    missing: Mutex<HashSet<String>>,
}

impl FakeAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn remove(&self, name: &str) {
        self.missing.lock().unwrap().insert(name.to_string());
    }
}

#[async_trait::async_trait]
impl AssetProvider for FakeAssets {
    async fn list_assets(
        &self,
        _offset: usize,
        _limit: usize,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        Ok(Vec::new())
    }

    async fn fetch_bytes(&self, id: &RecordId) -> anyhow::Result<Option<Vec<u8>>> {
        if self.missing.lock().unwrap().contains(id.as_str()) {
            return Ok(None);
        }
        Ok(Some(id.as_str().as_bytes().to_vec()))
    }
}

// ============================================================================
// Uploader
// ============================================================================

/// Uploader that tracks how many calls are in flight
#[derive(Default)]
pub struct FakeUploader {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    started: AtomicUsize,
    delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    /// Notified whenever an upload begins
    pub upload_started: Notify,
    /// Called when an upload begins, before any delay
    on_start: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl FakeUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        let uploader = Self::default();
        *uploader.delay.lock().unwrap() = delay;
        uploader
    }

    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Blocks every upload until the returned `Notify` fires
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn on_start(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_start.lock().unwrap() = Some(Box::new(f));
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Uploader for FakeUploader {
    async fn upload(&self, payload: &StagedPayload) -> anyhow::Result<RemoteLocator> {
        assert!(payload.path().exists(), "staged file missing during upload");
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.started.fetch_add(1, Ordering::SeqCst);
        if let Some(f) = self.on_start.lock().unwrap().as_ref() {
            f();
        }
        self.upload_started.notify_waiters();

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let record = payload.record_id().as_str();
        if self.failing.lock().unwrap().contains(record) {
            anyhow::bail!("remote rejected {record}");
        }
        Ok(RemoteLocator::new(format!("https://cdn.example.com/{}", payload.file_name())).unwrap())
    }
}

// ============================================================================
// Store wrapper
// ============================================================================

/// Store whose writes fail while `failing` is set
pub struct FlakyStore {
    inner: MemoryRecordStore,
    pub failing: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: MemoryRecordStore) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for FlakyStore {
    async fn insert_if_absent(&self, record: &SyncRecord) -> anyhow::Result<bool> {
        self.check()?;
        self.inner.insert_if_absent(record).await
    }

    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<SyncRecord>> {
        self.inner.get(id).await
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>> {
        self.inner.query(filter, limit).await
    }

    async fn count(&self, filter: &RecordFilter) -> anyhow::Result<u64> {
        self.inner.count(filter).await
    }

    async fn compare_and_swap(
        &self,
        record: &SyncRecord,
        expected_revision: u64,
    ) -> anyhow::Result<bool> {
        self.check()?;
        self.inner.compare_and_swap(record, expected_revision).await
    }

    async fn bulk_mutate(
        &self,
        filter: &RecordFilter,
        mutation: BulkMutation,
    ) -> anyhow::Result<u64> {
        self.check()?;
        self.inner.bulk_mutate(filter, mutation).await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.subscribe()
    }

    async fn delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        self.check()?;
        self.inner.delete(id).await
    }
}

// ============================================================================
// Engine
// ============================================================================

pub fn engine_config(staging: &Path, batch_size: u32, cap: usize) -> EngineConfig {
    EngineConfig {
        polling_period: Duration::from_millis(50),
        batch_size,
        max_concurrent_uploads: cap,
        upload_timeout: Duration::from_secs(10),
        retry_base_delay: Duration::from_secs(30),
        retry_max_delay: Duration::from_secs(3600),
        store_attempts: 2,
        staging_dir: staging.to_path_buf(),
    }
}

pub fn engine(
    store: Arc<dyn RecordStore>,
    assets: Arc<FakeAssets>,
    uploader: Arc<FakeUploader>,
    config: EngineConfig,
) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(store, assets, uploader, config).unwrap())
}

/// Drains every event currently buffered
pub fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Sizes of the batches started, in order
pub fn pass_sizes(events: &[EngineEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::PassStarted { batch } => Some(*batch),
            _ => None,
        })
        .collect()
}

/// Failure events per record id
pub fn failures(events: &[EngineEvent]) -> BTreeMap<String, usize> {
    let mut out = BTreeMap::new();
    for event in events {
        if let EngineEvent::RecordFailed { id, .. } = event {
            *out.entry(id.to_string()).or_insert(0) += 1;
        }
    }
    out
}
