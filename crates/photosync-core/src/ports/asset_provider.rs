//! Asset provider port (driven/secondary port)
//!
//! This module defines the interface to the local media library: listing
//! the assets it holds and reading the raw bytes of one asset for upload.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because library access errors are
//!   adapter-specific (filesystem, platform photo library, etc.).
//! - A missing asset is not an error: `fetch_bytes` returns `Ok(None)` so
//!   the caller can classify it as "asset no longer available".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MediaKind, RecordId};

/// One asset as reported by the library
///
/// This is a port-level DTO. The ingest use case maps it to a `SyncRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    /// Stable identifier of the asset within the library
    pub id: RecordId,
    /// Capture time (None if the library does not know it)
    pub created_at: Option<DateTime<Utc>>,
    /// Payload type
    pub media_kind: MediaKind,
}

/// Port trait for the local media library
#[async_trait::async_trait]
pub trait AssetProvider: Send + Sync {
    /// Lists assets in a stable order, one page at a time
    ///
    /// Returns fewer than `limit` entries (possibly none) past the end.
    async fn list_assets(&self, offset: usize, limit: usize)
        -> anyhow::Result<Vec<AssetDescriptor>>;

    /// Reads the raw payload of an asset
    ///
    /// Returns `Ok(None)` if the asset no longer exists.
    async fn fetch_bytes(&self, id: &RecordId) -> anyhow::Result<Option<Vec<u8>>>;
}
