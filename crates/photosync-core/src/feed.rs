//! Sectioned presentation feed
//!
//! A read-only view over the record store that groups records by their
//! `bucket_key` (UTC day). Sections are ordered newest day first; records
//! inside a section are ordered by `created_at` ascending.
//!
//! The feed is strictly downstream of the store. It subscribes to change
//! notifications, and every [`SectionedFeed::refresh`] recomputes the
//! snapshot and reports what changed since the previous one with
//! section-level and record-level granularity.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::sync::broadcast;

use crate::domain::{RecordId, SyncRecord};
use crate::ports::{RecordFilter, RecordStore, StoreChange};

/// Records captured on one day
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSection {
    pub bucket_key: NaiveDate,
    pub records: Vec<SyncRecord>,
}

/// Difference between two consecutive feed snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedDiff {
    pub inserted_sections: Vec<NaiveDate>,
    pub deleted_sections: Vec<NaiveDate>,
    pub inserted_records: Vec<RecordId>,
    pub updated_records: Vec<RecordId>,
    pub deleted_records: Vec<RecordId>,
}

impl FeedDiff {
    pub fn is_empty(&self) -> bool {
        self.inserted_sections.is_empty()
            && self.deleted_sections.is_empty()
            && self.inserted_records.is_empty()
            && self.updated_records.is_empty()
            && self.deleted_records.is_empty()
    }
}

/// Change-notified, day-grouped view over the record store
pub struct SectionedFeed {
    store: Arc<dyn RecordStore>,
    changes: broadcast::Receiver<StoreChange>,
    sections: Vec<FeedSection>,
}

impl SectionedFeed {
    /// Creates an empty feed; call [`refresh`](Self::refresh) to load it
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            changes,
            sections: Vec::new(),
        }
    }

    /// Current snapshot, newest day first
    pub fn sections(&self) -> &[FeedSection] {
        &self.sections
    }

    /// Total number of records in the snapshot
    pub fn len(&self) -> usize {
        self.sections.iter().map(|s| s.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Waits until the store reports a change
    ///
    /// Returns false once the store is gone. Missed notifications (lag)
    /// count as a change.
    pub async fn changed(&mut self) -> bool {
        match self.changes.recv().await {
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => true,
            Err(broadcast::error::RecvError::Closed) => false,
        }
    }

    /// Reloads the snapshot from the store and returns the difference
    pub async fn refresh(&mut self) -> Result<FeedDiff> {
        let records = self
            .store
            .query(&RecordFilter::new(), None)
            .await
            .context("Failed to load records for feed")?;

        let mut grouped: BTreeMap<NaiveDate, Vec<SyncRecord>> = BTreeMap::new();
        for record in records {
            grouped.entry(record.bucket_key()).or_default().push(record);
        }
        let next: Vec<FeedSection> = grouped
            .into_iter()
            .rev()
            .map(|(bucket_key, records)| FeedSection {
                bucket_key,
                records,
            })
            .collect();

        let diff = diff_sections(&self.sections, &next);
        self.sections = next;
        // Everything up to now is reflected in the snapshot.
        while self.changes.try_recv().is_ok() {}
        Ok(diff)
    }
}

fn diff_sections(prev: &[FeedSection], next: &[FeedSection]) -> FeedDiff {
    let prev_keys: HashSet<NaiveDate> = prev.iter().map(|s| s.bucket_key).collect();
    let next_keys: HashSet<NaiveDate> = next.iter().map(|s| s.bucket_key).collect();

    let prev_records: HashMap<&RecordId, &SyncRecord> = prev
        .iter()
        .flat_map(|s| s.records.iter())
        .map(|r| (r.id(), r))
        .collect();
    let next_records: HashMap<&RecordId, &SyncRecord> = next
        .iter()
        .flat_map(|s| s.records.iter())
        .map(|r| (r.id(), r))
        .collect();

    let mut diff = FeedDiff {
        inserted_sections: next
            .iter()
            .map(|s| s.bucket_key)
            .filter(|k| !prev_keys.contains(k))
            .collect(),
        deleted_sections: prev
            .iter()
            .map(|s| s.bucket_key)
            .filter(|k| !next_keys.contains(k))
            .collect(),
        ..FeedDiff::default()
    };

    for section in next {
        for record in &section.records {
            match prev_records.get(record.id()) {
                None => diff.inserted_records.push(record.id().clone()),
                Some(old) if *old != record => diff.updated_records.push(record.id().clone()),
                Some(_) => {}
            }
        }
    }
    for section in prev {
        for record in &section.records {
            if !next_records.contains_key(record.id()) {
                diff.deleted_records.push(record.id().clone());
            }
        }
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use crate::domain::{AttemptId, MediaKind, SyncStatus};
    use crate::ports::mutate;
    use crate::test_support::FakeStore;

    fn record(id: &str, day: u32, hour: u32) -> SyncRecord {
        SyncRecord::new(
            RecordId::new(id).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, day, hour, 0, 0).unwrap(),
            MediaKind::Image,
        )
    }

    #[tokio::test]
    async fn test_sections_newest_day_first() {
        let store = Arc::new(FakeStore::new());
        for r in [record("a", 1, 9), record("b", 3, 8), record("c", 3, 7)] {
            store.insert_if_absent(&r).await.unwrap();
        }

        let mut feed = SectionedFeed::new(store);
        let diff = feed.refresh().await.unwrap();

        assert_eq!(diff.inserted_sections.len(), 2);
        assert_eq!(diff.inserted_records.len(), 3);
        let sections = feed.sections();
        assert_eq!(sections[0].bucket_key, NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        let ids: Vec<&str> = sections[0].records.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
        assert_eq!(feed.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_reports_updates_and_deletes() {
        let store = Arc::new(FakeStore::new());
        for r in [record("a", 1, 9), record("b", 2, 9)] {
            store.insert_if_absent(&r).await.unwrap();
        }
        let mut feed = SectionedFeed::new(store.clone());
        feed.refresh().await.unwrap();

        let a = RecordId::new("a").unwrap();
        mutate(store.as_ref(), &a, |r| r.begin_sync(AttemptId::new()))
            .await
            .unwrap();
        store.delete(&RecordId::new("b").unwrap()).await.unwrap();
        assert!(feed.changed().await);

        let diff = feed.refresh().await.unwrap();
        assert_eq!(diff.updated_records, vec![a.clone()]);
        assert_eq!(diff.deleted_records, vec![RecordId::new("b").unwrap()]);
        assert_eq!(
            diff.deleted_sections,
            vec![NaiveDate::from_ymd_opt(2024, 2, 2).unwrap()]
        );
        assert_eq!(feed.sections()[0].records[0].status(), SyncStatus::Syncing);
    }

    #[tokio::test]
    async fn test_refresh_without_changes_is_empty() {
        let store = Arc::new(FakeStore::new());
        store.insert_if_absent(&record("a", 1, 9)).await.unwrap();
        let mut feed = SectionedFeed::new(store);
        feed.refresh().await.unwrap();
        assert!(feed.refresh().await.unwrap().is_empty());
    }
}
