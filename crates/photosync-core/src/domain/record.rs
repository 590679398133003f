//! SyncRecord domain entity
//!
//! A `SyncRecord` represents one locally-captured media item and tracks
//! whether its payload has been mirrored to the remote store.
//!
//! ## State Machine
//!
//! ```text
//!     ┌─────────┐  begin_sync   ┌──────────┐  complete_sync  ┌──────────┐
//!     │  Local  │ ────────────► │ Syncing  │ ──────────────► │  Synced  │
//!     └─────────┘               └──────────┘                 └──────────┘
//!          ▲                         │                             │
//!          │  fail_sync / release /  │                             │
//!          │  release_orphaned       │                             │
//!          └─────────────────────────┘                             │
//!          ▲                                                       │
//!          │                 reset_to_local (admin)                │
//!          └───────────────────────────────────────────────────────┘
//! ```
//!
//! Every claim stamps an [`AttemptId`]. Writes that end an attempt
//! (`complete_sync`, `fail_sync`, `release`) are fenced on that id, so a
//! record that was reset while the attempt was in flight rejects the late
//! write with [`DomainError::StaleAttempt`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{AttemptId, MediaKind, RecordId, RemoteLocator};

// ============================================================================
// SyncStatus
// ============================================================================

/// Reconciliation status of a record
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Not mirrored yet and not in flight; eligible for selection
    #[default]
    Local,
    /// Claimed by an upload task
    Syncing,
    /// Mirrored; the record carries a remote locator
    Synced,
}

impl SyncStatus {
    /// All statuses, in lifecycle order
    pub const ALL: [SyncStatus; 3] = [SyncStatus::Local, SyncStatus::Syncing, SyncStatus::Synced];

    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Local => "local",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(SyncStatus::Local),
            "syncing" => Ok(SyncStatus::Syncing),
            "synced" => Ok(SyncStatus::Synced),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// SyncRecord
// ============================================================================

/// One media item and its sync state
///
/// Fields are private; state changes go through the transition methods so
/// that `remote_locator.is_some() == (status == Synced)` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRecord {
    /// Identity, derived from the source asset's stable identifier
    id: RecordId,
    /// Capture time of the asset, immutable
    created_at: DateTime<Utc>,
    /// UTC day of `created_at`, used for grouping in presentation
    bucket_key: NaiveDate,
    /// Payload type tag
    media_kind: MediaKind,
    /// Current reconciliation status
    status: SyncStatus,
    /// Set only while `status == Synced`
    remote_locator: Option<RemoteLocator>,
    /// Attempt that currently owns the record (only while `Syncing`)
    attempt: Option<AttemptId>,
    /// Failures since the last successful sync or reset
    failed_attempts: u32,
    /// Earliest time the record may be selected again
    next_attempt_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure
    last_error: Option<String>,
    /// Bumped by the store on every applied write
    revision: u64,
    /// Last time any field changed
    updated_at: DateTime<Utc>,
}

impl SyncRecord {
    /// Creates a new `Local` record for a freshly observed asset
    pub fn new(id: RecordId, created_at: DateTime<Utc>, media_kind: MediaKind) -> Self {
        Self {
            id,
            created_at,
            bucket_key: created_at.date_naive(),
            media_kind,
            status: SyncStatus::Local,
            remote_locator: None,
            attempt: None,
            failed_attempts: 0,
            next_attempt_at: None,
            last_error: None,
            revision: 0,
            updated_at: Utc::now(),
        }
    }

    /// Creates a record that is already mirrored remotely
    ///
    /// Used when importing records whose payload was uploaded elsewhere.
    pub fn new_synced(
        id: RecordId,
        created_at: DateTime<Utc>,
        media_kind: MediaKind,
        locator: RemoteLocator,
    ) -> Self {
        let mut record = Self::new(id, created_at, media_kind);
        record.status = SyncStatus::Synced;
        record.remote_locator = Some(locator);
        record
    }

    // --- Accessors ---

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn bucket_key(&self) -> NaiveDate {
        self.bucket_key
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn remote_locator(&self) -> Option<&RemoteLocator> {
        self.remote_locator.as_ref()
    }

    pub fn attempt(&self) -> Option<AttemptId> {
        self.attempt
    }

    pub fn failed_attempts(&self) -> u32 {
        self.failed_attempts
    }

    pub fn next_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.next_attempt_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Sets the stored revision
    ///
    /// Store adapters call this when loading or after applying a write.
    pub fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }

    /// Returns true if the record is `Local` and its backoff (if any) has elapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SyncStatus::Local && self.next_attempt_at.map_or(true, |t| t <= now)
    }

    // --- Transitions ---

    /// Claims the record for an upload attempt (`Local -> Syncing`)
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the record is not `Local`.
    pub fn begin_sync(&mut self, attempt: AttemptId) -> Result<(), DomainError> {
        if self.status != SyncStatus::Local {
            return Err(self.invalid(SyncStatus::Syncing));
        }
        self.status = SyncStatus::Syncing;
        self.attempt = Some(attempt);
        self.touch();
        Ok(())
    }

    /// Completes an attempt successfully (`Syncing -> Synced`)
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StaleAttempt` if `attempt` no longer owns the record.
    pub fn complete_sync(
        &mut self,
        attempt: AttemptId,
        locator: RemoteLocator,
    ) -> Result<(), DomainError> {
        self.check_owner(attempt)?;
        self.status = SyncStatus::Synced;
        self.remote_locator = Some(locator);
        self.attempt = None;
        self.failed_attempts = 0;
        self.next_attempt_at = None;
        self.last_error = None;
        self.touch();
        Ok(())
    }

    /// Ends an attempt with a failure (`Syncing -> Local`) and schedules the retry
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StaleAttempt` if `attempt` no longer owns the record.
    pub fn fail_sync(
        &mut self,
        attempt: AttemptId,
        error: impl Into<String>,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        self.check_owner(attempt)?;
        self.status = SyncStatus::Local;
        self.attempt = None;
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.next_attempt_at = Some(next_attempt_at);
        self.last_error = Some(error.into());
        self.touch();
        Ok(())
    }

    /// Gives the claim back without counting a failure (`Syncing -> Local`)
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StaleAttempt` if `attempt` no longer owns the record.
    pub fn release(&mut self, attempt: AttemptId) -> Result<(), DomainError> {
        self.check_owner(attempt)?;
        self.status = SyncStatus::Local;
        self.attempt = None;
        self.touch();
        Ok(())
    }

    /// Administrative reset: any status back to a fresh `Local`
    pub fn reset_to_local(&mut self) {
        self.status = SyncStatus::Local;
        self.remote_locator = None;
        self.attempt = None;
        self.failed_attempts = 0;
        self.next_attempt_at = None;
        self.last_error = None;
        self.touch();
    }

    /// Releases a `Syncing` record whose owning attempt is gone
    ///
    /// # Errors
    ///
    /// Returns `DomainError::InvalidTransition` if the record is not `Syncing`.
    pub fn release_orphaned(&mut self) -> Result<(), DomainError> {
        if self.status != SyncStatus::Syncing {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: SyncStatus::Local.to_string(),
            });
        }
        self.status = SyncStatus::Local;
        self.attempt = None;
        self.touch();
        Ok(())
    }

    /// Makes a `Local` record due immediately. No-op for other statuses.
    pub fn clear_backoff(&mut self) {
        if self.status == SyncStatus::Local && self.next_attempt_at.is_some() {
            self.next_attempt_at = None;
            self.touch();
        }
    }

    fn check_owner(&self, attempt: AttemptId) -> Result<(), DomainError> {
        if self.status == SyncStatus::Syncing && self.attempt == Some(attempt) {
            Ok(())
        } else {
            Err(DomainError::StaleAttempt {
                record: self.id.to_string(),
                attempt: attempt.to_string(),
            })
        }
    }

    fn invalid(&self, to: SyncStatus) -> DomainError {
        DomainError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record() -> SyncRecord {
        let created = Utc.with_ymd_and_hms(2024, 3, 14, 23, 59, 0).unwrap();
        SyncRecord::new(RecordId::new("asset-1").unwrap(), created, MediaKind::Image)
    }

    fn locator() -> RemoteLocator {
        RemoteLocator::new("https://cdn.example.com/asset-1.jpg").unwrap()
    }

    fn assert_locator_invariant(r: &SyncRecord) {
        assert_eq!(r.remote_locator().is_some(), r.status() == SyncStatus::Synced);
    }

    #[test]
    fn test_new_record_is_local() {
        let r = record();
        assert_eq!(r.status(), SyncStatus::Local);
        assert_eq!(r.bucket_key(), NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(r.revision(), 0);
        assert!(r.is_due(Utc::now()));
        assert_locator_invariant(&r);
    }

    #[test]
    fn test_status_string_roundtrip() {
        for status in SyncStatus::ALL {
            assert_eq!(status.as_str().parse::<SyncStatus>().unwrap(), status);
        }
        assert!(matches!(
            "pending".parse::<SyncStatus>(),
            Err(DomainError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_successful_attempt() {
        let mut r = record();
        let attempt = AttemptId::new();
        r.begin_sync(attempt).unwrap();
        assert_eq!(r.status(), SyncStatus::Syncing);
        assert_eq!(r.attempt(), Some(attempt));
        assert_locator_invariant(&r);

        r.complete_sync(attempt, locator()).unwrap();
        assert_eq!(r.status(), SyncStatus::Synced);
        assert_eq!(r.attempt(), None);
        assert_eq!(r.remote_locator(), Some(&locator()));
        assert_locator_invariant(&r);
    }

    #[test]
    fn test_begin_sync_requires_local() {
        let mut r = record();
        r.begin_sync(AttemptId::new()).unwrap();
        let err = r.begin_sync(AttemptId::new()).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
    }

    #[test]
    fn test_failed_attempt_schedules_retry() {
        let mut r = record();
        let attempt = AttemptId::new();
        let retry_at = Utc::now() + Duration::seconds(30);
        r.begin_sync(attempt).unwrap();
        r.fail_sync(attempt, "connection reset", retry_at).unwrap();

        assert_eq!(r.status(), SyncStatus::Local);
        assert_eq!(r.failed_attempts(), 1);
        assert_eq!(r.last_error(), Some("connection reset"));
        assert_eq!(r.next_attempt_at(), Some(retry_at));
        assert!(!r.is_due(Utc::now()));
        assert!(r.is_due(retry_at));
        assert_locator_invariant(&r);
    }

    #[test]
    fn test_stale_attempt_is_rejected_after_reset() {
        let mut r = record();
        let attempt = AttemptId::new();
        r.begin_sync(attempt).unwrap();
        r.reset_to_local();

        let err = r.complete_sync(attempt, locator()).unwrap_err();
        assert!(matches!(err, DomainError::StaleAttempt { .. }));
        let err = r.fail_sync(attempt, "late", Utc::now()).unwrap_err();
        assert!(matches!(err, DomainError::StaleAttempt { .. }));
        assert_eq!(r.status(), SyncStatus::Local);
        assert_eq!(r.failed_attempts(), 0);
    }

    #[test]
    fn test_stale_attempt_after_reclaim() {
        let mut r = record();
        let first = AttemptId::new();
        r.begin_sync(first).unwrap();
        r.release_orphaned().unwrap();
        let second = AttemptId::new();
        r.begin_sync(second).unwrap();

        assert!(r.release(first).is_err());
        assert_eq!(r.attempt(), Some(second));
        r.release(second).unwrap();
        assert_eq!(r.status(), SyncStatus::Local);
        assert_eq!(r.failed_attempts(), 0);
    }

    #[test]
    fn test_reset_clears_synced_state() {
        let mut r = record();
        let attempt = AttemptId::new();
        r.begin_sync(attempt).unwrap();
        r.complete_sync(attempt, locator()).unwrap();
        r.reset_to_local();

        assert_eq!(r.status(), SyncStatus::Local);
        assert!(r.remote_locator().is_none());
        assert_locator_invariant(&r);
    }

    #[test]
    fn test_release_orphaned_requires_syncing() {
        let mut r = record();
        assert!(r.release_orphaned().is_err());
    }

    #[test]
    fn test_clear_backoff() {
        let mut r = record();
        let attempt = AttemptId::new();
        r.begin_sync(attempt).unwrap();
        r.fail_sync(attempt, "timeout", Utc::now() + Duration::hours(1))
            .unwrap();
        r.clear_backoff();
        assert!(r.is_due(Utc::now()));
        assert_eq!(r.failed_attempts(), 1);
    }

    #[test]
    fn test_new_synced_holds_locator() {
        let r = SyncRecord::new_synced(
            RecordId::new("asset-2").unwrap(),
            Utc::now(),
            MediaKind::Video,
            locator(),
        );
        assert_eq!(r.status(), SyncStatus::Synced);
        assert!(!r.is_due(Utc::now()));
        assert_locator_invariant(&r);
    }

    #[test]
    fn test_serde_roundtrip_keeps_private_fields() {
        let mut r = record();
        r.begin_sync(AttemptId::new()).unwrap();
        r.set_revision(7);
        let json = serde_json::to_string(&r).unwrap();
        let back: SyncRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
