//! Record store port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying
//! `SyncRecord`s. The sync engine treats the store as authoritative and
//! routes every write through it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, etc.) and don't need domain-level classification.
//! - Per-record atomicity is expressed as a revision-checked
//!   `compare_and_swap`. The [`mutate`] helper builds the read-modify-write
//!   loop on top of it.
//! - Every applied write is announced on a broadcast channel. Consumers that
//!   only need a coarse "something changed" signal can ignore the payload.
//! - Writes are linearizable with respect to queries from the same caller:
//!   once a write future resolves, subsequent queries observe it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::domain::{DomainError, RecordId, SyncRecord, SyncStatus};

/// Number of read-modify-write rounds [`mutate`] attempts under contention
pub const MAX_MUTATION_ATTEMPTS: usize = 8;

/// Capacity of the change broadcast channel used by store adapters
pub const CHANGE_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// RecordFilter
// ============================================================================

/// Filter criteria for querying records
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic.
///
/// # Example
///
/// ```
/// use chrono::Utc;
/// use photosync_core::domain::SyncStatus;
/// use photosync_core::ports::RecordFilter;
///
/// // Local records whose retry backoff has elapsed
/// let filter = RecordFilter::new()
///     .with_status(SyncStatus::Local)
///     .due_at(Utc::now());
/// assert!(!filter.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Filter by sync status
    pub status: Option<SyncStatus>,
    /// Keep only records with no `next_attempt_at` or one at or before this time
    pub due_at: Option<DateTime<Utc>>,
}

impl RecordFilter {
    /// Creates a new empty filter (matches all records)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status filter
    pub fn with_status(mut self, status: SyncStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the due-time filter
    pub fn due_at(mut self, now: DateTime<Utc>) -> Self {
        self.due_at = Some(now);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.due_at.is_none()
    }

    /// Evaluates the filter against a record
    ///
    /// Store adapters without a query language (e.g. in-memory) use this
    /// directly; SQL adapters translate the fields into a `WHERE` clause.
    pub fn matches(&self, record: &SyncRecord) -> bool {
        if let Some(status) = self.status {
            if record.status() != status {
                return false;
            }
        }
        if let Some(now) = self.due_at {
            if record.next_attempt_at().is_some_and(|t| t > now) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// BulkMutation
// ============================================================================

/// A mutation applied to every record matching a filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkMutation {
    /// Administrative reset of every matching record to a fresh `Local`
    ResetToLocal,
    /// Release `Syncing` records left behind by a crashed or halted pass
    ReleaseOrphaned,
    /// Make `Local` records due immediately
    ClearBackoff,
}

impl BulkMutation {
    /// Applies the mutation to one record
    ///
    /// Returns true if the record changed and must be written back.
    pub fn apply(&self, record: &mut SyncRecord) -> bool {
        match self {
            BulkMutation::ResetToLocal => {
                record.reset_to_local();
                true
            }
            BulkMutation::ReleaseOrphaned => record.release_orphaned().is_ok(),
            BulkMutation::ClearBackoff => {
                let before = record.next_attempt_at();
                record.clear_backoff();
                before != record.next_attempt_at()
            }
        }
    }
}

// ============================================================================
// StoreChange
// ============================================================================

/// Kind of change announced by a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// Change notification delivered to subscribers after every applied write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    /// What happened to the records
    pub kind: ChangeKind,
    /// Records affected by the write
    pub ids: Vec<RecordId>,
}

impl StoreChange {
    pub fn inserted(id: RecordId) -> Self {
        Self {
            kind: ChangeKind::Inserted,
            ids: vec![id],
        }
    }

    pub fn updated(ids: Vec<RecordId>) -> Self {
        Self {
            kind: ChangeKind::Updated,
            ids,
        }
    }

    pub fn deleted(id: RecordId) -> Self {
        Self {
            kind: ChangeKind::Deleted,
            ids: vec![id],
        }
    }
}

// ============================================================================
// RecordStore trait
// ============================================================================

/// Port trait for record persistence
///
/// ## Implementation Notes
///
/// - `query` results are ordered by `created_at` ascending, then by id.
/// - `compare_and_swap` must be atomic per record: it writes only if the
///   stored revision equals `expected_revision`, and stores
///   `expected_revision + 1`.
/// - Every applied write (insert, CAS, bulk mutation, delete) sends a
///   [`StoreChange`]. No-op writes send nothing.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a record unless one with the same id exists
    ///
    /// Returns true if the record was inserted.
    async fn insert_if_absent(&self, record: &SyncRecord) -> anyhow::Result<bool>;

    /// Retrieves a record by id
    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<SyncRecord>>;

    /// Queries records matching the filter, oldest first
    async fn query(
        &self,
        filter: &RecordFilter,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>>;

    /// Counts records matching the filter
    async fn count(&self, filter: &RecordFilter) -> anyhow::Result<u64>;

    /// Writes `record` if the stored revision equals `expected_revision`
    ///
    /// Returns false (and writes nothing) on a revision mismatch or if the
    /// record no longer exists.
    async fn compare_and_swap(
        &self,
        record: &SyncRecord,
        expected_revision: u64,
    ) -> anyhow::Result<bool>;

    /// Applies `mutation` to every record matching `filter`
    ///
    /// Returns the number of records that changed.
    async fn bulk_mutate(
        &self,
        filter: &RecordFilter,
        mutation: BulkMutation,
    ) -> anyhow::Result<u64>;

    /// Subscribes to change notifications
    fn subscribe(&self) -> broadcast::Receiver<StoreChange>;

    /// Deletes a record by id
    ///
    /// Returns true if a record was removed. Never called by the sync engine.
    async fn delete(&self, id: &RecordId) -> anyhow::Result<bool>;

    // --- Provided methods ---

    /// Records with the given status, oldest first
    async fn query_by_status(
        &self,
        status: SyncStatus,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>> {
        self.query(&RecordFilter::new().with_status(status), limit)
            .await
    }

    /// Number of records with the given status
    async fn count_by_status(&self, status: SyncStatus) -> anyhow::Result<u64> {
        self.count(&RecordFilter::new().with_status(status)).await
    }

    /// Number of records per status (every status present, possibly zero)
    async fn count_by_status_all(&self) -> anyhow::Result<BTreeMap<SyncStatus, u64>> {
        let mut counts = BTreeMap::new();
        for status in SyncStatus::ALL {
            counts.insert(status, self.count_by_status(status).await?);
        }
        Ok(counts)
    }
}

// ============================================================================
// mutate helper
// ============================================================================

/// Result of a [`mutate`] call
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome {
    /// The closure succeeded and the write was stored
    Applied(SyncRecord),
    /// The closure rejected the change; nothing was written
    Rejected(DomainError),
    /// No record with that id exists
    NotFound,
}

impl MutationOutcome {
    /// Returns true if the write was stored
    pub fn is_applied(&self) -> bool {
        matches!(self, MutationOutcome::Applied(_))
    }
}

/// Atomically applies `f` to one record
///
/// Reads the record, applies `f` to a copy and writes it back with
/// [`RecordStore::compare_and_swap`]. On a revision conflict the record is
/// re-read and `f` re-applied, up to [`MAX_MUTATION_ATTEMPTS`] times.
///
/// # Errors
///
/// Returns the store's error, or an error if contention persists past the
/// attempt limit.
pub async fn mutate<S, F>(store: &S, id: &RecordId, mut f: F) -> anyhow::Result<MutationOutcome>
where
    S: RecordStore + ?Sized,
    F: FnMut(&mut SyncRecord) -> Result<(), DomainError> + Send,
{
    for _ in 0..MAX_MUTATION_ATTEMPTS {
        let Some(current) = store.get(id).await? else {
            return Ok(MutationOutcome::NotFound);
        };
        let expected = current.revision();
        let mut next = current;
        if let Err(e) = f(&mut next) {
            return Ok(MutationOutcome::Rejected(e));
        }
        if store.compare_and_swap(&next, expected).await? {
            next.set_revision(expected + 1);
            return Ok(MutationOutcome::Applied(next));
        }
        tracing::trace!(record_id = %id, revision = expected, "Revision conflict, retrying");
    }
    anyhow::bail!(
        "record {} kept changing during {} mutation attempts",
        id,
        MAX_MUTATION_ATTEMPTS
    )
}
