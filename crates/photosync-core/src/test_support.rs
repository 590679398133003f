//! In-crate test doubles for the port traits

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{RecordId, SyncRecord};
use crate::ports::{
    AssetDescriptor, AssetProvider, BulkMutation, RecordFilter, RecordStore, StoreChange,
};

/// Vec-backed record store; one lock around everything
pub(crate) struct FakeStore {
    records: Mutex<Vec<SyncRecord>>,
    changes: broadcast::Sender<StoreChange>,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            records: Mutex::new(Vec::new()),
            changes,
        }
    }

    fn notify(&self, change: StoreChange) {
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn insert_if_absent(&self, record: &SyncRecord) -> anyhow::Result<bool> {
        let mut records = self.records.lock().unwrap();
        if records.iter().any(|r| r.id() == record.id()) {
            return Ok(false);
        }
        records.push(record.clone());
        drop(records);
        self.notify(StoreChange::inserted(record.id().clone()));
        Ok(true)
    }

    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<SyncRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().find(|r| r.id() == id).cloned())
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>> {
        let mut out: Vec<SyncRecord> = self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.created_at(), a.id()).cmp(&(b.created_at(), b.id())));
        if let Some(limit) = limit {
            out.truncate(limit as usize);
        }
        Ok(out)
    }

    async fn count(&self, filter: &RecordFilter) -> anyhow::Result<u64> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| filter.matches(r)).count() as u64)
    }

    async fn compare_and_swap(
        &self,
        record: &SyncRecord,
        expected_revision: u64,
    ) -> anyhow::Result<bool> {
        let mut records = self.records.lock().unwrap();
        let Some(slot) = records.iter_mut().find(|r| r.id() == record.id()) else {
            return Ok(false);
        };
        if slot.revision() != expected_revision {
            return Ok(false);
        }
        let mut stored = record.clone();
        stored.set_revision(expected_revision + 1);
        *slot = stored;
        drop(records);
        self.notify(StoreChange::updated(vec![record.id().clone()]));
        Ok(true)
    }

    async fn bulk_mutate(
        &self,
        filter: &RecordFilter,
        mutation: BulkMutation,
    ) -> anyhow::Result<u64> {
        let mut changed = Vec::new();
        for record in self.records.lock().unwrap().iter_mut() {
            if filter.matches(record) && mutation.apply(record) {
                record.set_revision(record.revision() + 1);
                changed.push(record.id().clone());
            }
        }
        let count = changed.len() as u64;
        if !changed.is_empty() {
            self.notify(StoreChange::updated(changed));
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id() != id);
        let removed = records.len() != before;
        drop(records);
        if removed {
            self.notify(StoreChange::deleted(id.clone()));
        }
        Ok(removed)
    }
}

/// Asset provider serving a fixed list
pub(crate) struct FakeAssets {
    pub(crate) assets: Vec<AssetDescriptor>,
}

#[async_trait]
impl AssetProvider for FakeAssets {
    async fn list_assets(
        &self,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        Ok(self.assets.iter().skip(offset).take(limit).cloned().collect())
    }

    async fn fetch_bytes(&self, id: &RecordId) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self
            .assets
            .iter()
            .find(|a| &a.id == id)
            .map(|a| a.id.as_str().as_bytes().to_vec()))
    }
}
