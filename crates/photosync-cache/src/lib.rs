//! PhotoSync Cache - Local record persistence
//!
//! Adapters for the `RecordStore` port from `photosync-core`:
//! - SQLite-backed store for the daemon
//! - In-memory store for tests and ephemeral runs
//!
//! ## Architecture
//!
//! This crate is a driven (secondary) adapter in the hexagonal
//! architecture. Both stores broadcast a `StoreChange` after every applied
//! write so the sync scheduler and the presentation feed can react.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteRecordStore`] - `RecordStore` over SQLite
//! - [`MemoryRecordStore`] - `RecordStore` over a `DashMap`
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use photosync_cache::{DatabasePool, SqliteRecordStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/photosync/records.db")).await?;
//! let store = SqliteRecordStore::new(pool.pool().clone());
//! // Use store as RecordStore...
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod pool;
pub mod repository;

pub use memory::MemoryRecordStore;
pub use pool::DatabasePool;
pub use repository::SqliteRecordStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
