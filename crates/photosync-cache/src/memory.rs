//! In-memory implementation of the RecordStore port
//!
//! Backed by a [`DashMap`]: the per-entry lock taken by `get_mut` makes each
//! `compare_and_swap` atomic for its record without a global lock. Used by
//! tests and by ephemeral runs that do not need persistence.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;

use photosync_core::domain::{RecordId, SyncRecord};
use photosync_core::ports::{
    BulkMutation, RecordFilter, RecordStore, StoreChange, CHANGE_CHANNEL_CAPACITY,
};

/// Record store kept entirely in memory
///
/// Cheap to clone; clones share the same records and change channel.
#[derive(Clone)]
pub struct MemoryRecordStore {
    records: Arc<DashMap<RecordId, SyncRecord>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(DashMap::new()),
            changes,
        }
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn notify(&self, change: StoreChange) {
        let _ = self.changes.send(change);
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_if_absent(&self, record: &SyncRecord) -> anyhow::Result<bool> {
        let inserted = match self.records.entry(record.id().clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let mut stored = record.clone();
                stored.set_revision(0);
                slot.insert(stored);
                true
            }
        };
        if inserted {
            self.notify(StoreChange::inserted(record.id().clone()));
        }
        Ok(inserted)
    }

    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<SyncRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>> {
        let mut records: Vec<SyncRecord> = self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        records.sort_by(|a, b| {
            a.created_at()
                .cmp(&b.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        if let Some(limit) = limit {
            records.truncate(limit as usize);
        }
        Ok(records)
    }

    async fn count(&self, filter: &RecordFilter) -> anyhow::Result<u64> {
        Ok(self
            .records
            .iter()
            .filter(|r| filter.matches(r.value()))
            .count() as u64)
    }

    async fn compare_and_swap(
        &self,
        record: &SyncRecord,
        expected_revision: u64,
    ) -> anyhow::Result<bool> {
        let applied = match self.records.get_mut(record.id()) {
            Some(mut slot) if slot.revision() == expected_revision => {
                let mut stored = record.clone();
                stored.set_revision(expected_revision + 1);
                *slot = stored;
                true
            }
            _ => false,
        };
        if applied {
            self.notify(StoreChange::updated(vec![record.id().clone()]));
        }
        Ok(applied)
    }

    async fn bulk_mutate(
        &self,
        filter: &RecordFilter,
        mutation: BulkMutation,
    ) -> anyhow::Result<u64> {
        let mut changed = Vec::new();
        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if filter.matches(record) && mutation.apply(record) {
                let revision = record.revision() + 1;
                record.set_revision(revision);
                changed.push(record.id().clone());
            }
        }

        let count = changed.len() as u64;
        tracing::debug!(?mutation, count, "Applied bulk mutation");
        if !changed.is_empty() {
            self.notify(StoreChange::updated(changed));
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        let removed = self.records.remove(id).is_some();
        if removed {
            self.notify(StoreChange::deleted(id.clone()));
        }
        Ok(removed)
    }
}
