//! Uploader port (driven/secondary port)
//!
//! This module defines the remote transfer interface and the staged payload
//! handed to it.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transfer errors are adapter-specific.
//! - [`StagedPayload`] owns its staging file: dropping the payload removes
//!   the file, so staging space is released whether the upload succeeds,
//!   fails or is abandoned.

use std::path::{Path, PathBuf};

use crate::domain::{MediaKind, RecordId, RemoteLocator};

// ============================================================================
// StagedPayload
// ============================================================================

/// A record's payload written to the staging area, ready for transfer
#[derive(Debug)]
pub struct StagedPayload {
    record_id: RecordId,
    path: PathBuf,
    media_kind: MediaKind,
    size_bytes: u64,
}

impl StagedPayload {
    /// Takes ownership of a staged file
    pub fn new(record_id: RecordId, path: PathBuf, media_kind: MediaKind, size_bytes: u64) -> Self {
        Self {
            record_id,
            path,
            media_kind,
            size_bytes,
        }
    }

    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Location of the staged file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Final path component of the staged file
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn media_kind(&self) -> MediaKind {
        self.media_kind
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

impl Drop for StagedPayload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to remove staged payload"
                );
            }
        }
    }
}

// ============================================================================
// Uploader trait
// ============================================================================

/// Port trait for the remote store
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Transfers a staged payload and returns where it now lives
    async fn upload(&self, payload: &StagedPayload) -> anyhow::Result<RemoteLocator>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staged_payload_removes_file_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("asset-1-0123456789abcdef.jpg");
        std::fs::write(&path, b"jpeg").unwrap();

        let payload = StagedPayload::new(
            RecordId::new("asset-1").unwrap(),
            path.clone(),
            MediaKind::Image,
            4,
        );
        assert_eq!(payload.file_name(), "asset-1-0123456789abcdef.jpg");
        assert_eq!(payload.size_bytes(), 4);
        assert!(path.exists());

        drop(payload);
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let payload = StagedPayload::new(
            RecordId::new("gone").unwrap(),
            dir.path().join("gone.bin"),
            MediaKind::Unknown,
            0,
        );
        drop(payload);
    }
}
