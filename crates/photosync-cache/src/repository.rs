//! SQLite implementation of the RecordStore port
//!
//! Provides [`SqliteRecordStore`], which persists `SyncRecord`s in the
//! `sync_records` table and announces every applied write on a broadcast
//! channel.
//!
//! ## Design Notes
//!
//! - Timestamps are stored as RFC 3339 strings with fixed microsecond
//!   precision and a `Z` suffix so that `ORDER BY created_at` and the
//!   `next_attempt_at <= ?` filter compare chronologically.
//! - `compare_and_swap` is a single `UPDATE ... WHERE revision = ?`, which
//!   SQLite executes atomically.
//! - Bulk mutations are single `UPDATE ... RETURNING id` statements that
//!   mirror the corresponding `SyncRecord` transitions.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tokio::sync::broadcast;

use photosync_core::domain::{MediaKind, RecordId, SyncRecord, SyncStatus};
use photosync_core::ports::{
    BulkMutation, RecordFilter, RecordStore, StoreChange, CHANGE_CHANNEL_CAPACITY,
};

use crate::CacheError;

/// SQLite-backed record store
///
/// Cheap to clone; clones share the pool and the change channel.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    changes: broadcast::Sender<StoreChange>,
}

impl SqliteRecordStore {
    /// Creates a new store over an already-migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    fn notify(&self, change: StoreChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

// ============================================================================
// Conversion helpers
// ============================================================================

fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CacheError::SerializationError(format!("Invalid datetime '{}': {}", s, e)))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    s.as_deref().map(parse_datetime).transpose()
}

/// Parameters shared by the WHERE clause of queries and bulk updates
struct FilterClause {
    sql: String,
    binds: Vec<String>,
}

fn filter_clause(filter: &RecordFilter) -> FilterClause {
    let mut sql = String::from(" WHERE 1=1");
    let mut binds = Vec::new();

    if let Some(status) = filter.status {
        sql.push_str(" AND status = ?");
        binds.push(status.as_str().to_string());
    }
    if let Some(now) = filter.due_at {
        sql.push_str(" AND (next_attempt_at IS NULL OR next_attempt_at <= ?)");
        binds.push(format_datetime(now));
    }

    FilterClause { sql, binds }
}

// ============================================================================
// Row mapping
// ============================================================================

/// Reconstruct a SyncRecord from a database row
///
/// Goes through serde since the entity's fields are private and can only
/// be set through transitions or deserialization.
fn record_from_row(row: &SqliteRow) -> Result<SyncRecord, CacheError> {
    let id: String = row.get("id");
    let created_at = parse_datetime(row.get::<String, _>("created_at").as_str())?;
    let bucket_key_str: String = row.get("bucket_key");
    let bucket_key = NaiveDate::parse_from_str(&bucket_key_str, "%Y-%m-%d").map_err(|e| {
        CacheError::SerializationError(format!("Invalid bucket key '{}': {}", bucket_key_str, e))
    })?;
    let media_kind = MediaKind::from_i64(row.get("media_kind"));
    let status: SyncStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|e: photosync_core::domain::DomainError| {
            CacheError::SerializationError(e.to_string())
        })?;
    let remote_locator: Option<String> = row.get("remote_locator");
    let attempt: Option<String> = row.get("attempt");
    let failed_attempts: i64 = row.get("failed_attempts");
    let next_attempt_at = parse_optional_datetime(row.get("next_attempt_at"))?;
    let last_error: Option<String> = row.get("last_error");
    let revision: i64 = row.get("revision");
    let updated_at = parse_datetime(row.get::<String, _>("updated_at").as_str())?;

    let record_json = serde_json::json!({
        "id": id,
        "created_at": created_at,
        "bucket_key": bucket_key,
        "media_kind": media_kind,
        "status": status,
        "remote_locator": remote_locator,
        "attempt": attempt,
        "failed_attempts": failed_attempts,
        "next_attempt_at": next_attempt_at,
        "last_error": last_error,
        "revision": revision,
        "updated_at": updated_at,
    });

    serde_json::from_value(record_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to reconstruct record {}: {}", id, e))
    })
}

/// SET clause and extra WHERE guard for each bulk mutation
fn bulk_update_sql(mutation: BulkMutation) -> (&'static str, &'static str) {
    match mutation {
        BulkMutation::ResetToLocal => (
            "status = 'local', remote_locator = NULL, attempt = NULL, failed_attempts = 0, \
             next_attempt_at = NULL, last_error = NULL",
            "",
        ),
        BulkMutation::ReleaseOrphaned => (
            "status = 'local', attempt = NULL",
            " AND status = 'syncing'",
        ),
        BulkMutation::ClearBackoff => (
            "next_attempt_at = NULL",
            " AND status = 'local' AND next_attempt_at IS NOT NULL",
        ),
    }
}

// ============================================================================
// RecordStore implementation
// ============================================================================

#[async_trait::async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert_if_absent(&self, record: &SyncRecord) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO sync_records \
             (id, created_at, bucket_key, media_kind, status, remote_locator, attempt, \
              failed_attempts, next_attempt_at, last_error, revision, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(record.id().as_str())
        .bind(format_datetime(record.created_at()))
        .bind(record.bucket_key().format("%Y-%m-%d").to_string())
        .bind(record.media_kind().as_i64())
        .bind(record.status().as_str())
        .bind(record.remote_locator().map(|l| l.as_str().to_string()))
        .bind(record.attempt().map(|a| a.to_string()))
        .bind(i64::from(record.failed_attempts()))
        .bind(record.next_attempt_at().map(format_datetime))
        .bind(record.last_error())
        .bind(format_datetime(record.updated_at()))
        .execute(&self.pool)
        .await?;

        let inserted = result.rows_affected() == 1;
        if inserted {
            tracing::trace!(record_id = %record.id(), "Inserted record");
            self.notify(StoreChange::inserted(record.id().clone()));
        }
        Ok(inserted)
    }

    async fn get(&self, id: &RecordId) -> anyhow::Result<Option<SyncRecord>> {
        let row = sqlx::query("SELECT * FROM sync_records WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn query(
        &self,
        filter: &RecordFilter,
        limit: Option<u32>,
    ) -> anyhow::Result<Vec<SyncRecord>> {
        let clause = filter_clause(filter);
        let mut sql = format!("SELECT * FROM sync_records{}", clause.sql);
        sql.push_str(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        for bind in &clause.binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn count(&self, filter: &RecordFilter) -> anyhow::Result<u64> {
        let clause = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM sync_records{}", clause.sql);

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &clause.binds {
            query = query.bind(bind);
        }
        let count = query.fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn compare_and_swap(
        &self,
        record: &SyncRecord,
        expected_revision: u64,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE sync_records SET \
             status = ?, remote_locator = ?, attempt = ?, failed_attempts = ?, \
             next_attempt_at = ?, last_error = ?, updated_at = ?, revision = revision + 1 \
             WHERE id = ? AND revision = ?",
        )
        .bind(record.status().as_str())
        .bind(record.remote_locator().map(|l| l.as_str().to_string()))
        .bind(record.attempt().map(|a| a.to_string()))
        .bind(i64::from(record.failed_attempts()))
        .bind(record.next_attempt_at().map(format_datetime))
        .bind(record.last_error())
        .bind(format_datetime(record.updated_at()))
        .bind(record.id().as_str())
        .bind(expected_revision as i64)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        if applied {
            tracing::trace!(
                record_id = %record.id(),
                status = %record.status(),
                revision = expected_revision + 1,
                "Updated record"
            );
            self.notify(StoreChange::updated(vec![record.id().clone()]));
        }
        Ok(applied)
    }

    async fn bulk_mutate(
        &self,
        filter: &RecordFilter,
        mutation: BulkMutation,
    ) -> anyhow::Result<u64> {
        let clause = filter_clause(filter);
        let (set, guard) = bulk_update_sql(mutation);
        let sql = format!(
            "UPDATE sync_records SET {set}, updated_at = ?, revision = revision + 1{}{guard} \
             RETURNING id",
            clause.sql
        );

        let mut query = sqlx::query_scalar::<_, String>(&sql).bind(format_datetime(Utc::now()));
        for bind in &clause.binds {
            query = query.bind(bind);
        }
        let ids = query.fetch_all(&self.pool).await?;

        let ids = ids
            .into_iter()
            .map(RecordId::new)
            .collect::<Result<Vec<_>, _>>()?;
        let count = ids.len() as u64;
        tracing::debug!(?mutation, count, "Applied bulk mutation");
        if !ids.is_empty() {
            self.notify(StoreChange::updated(ids));
        }
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    async fn delete(&self, id: &RecordId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sync_records WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() == 1;
        if removed {
            tracing::trace!(record_id = %id, "Deleted record");
            self.notify(StoreChange::deleted(id.clone()));
        }
        Ok(removed)
    }
}
