//! Payload staging
//!
//! The [`PayloadMaterializer`] copies an asset's bytes into the staging
//! directory so the uploader can stream them from disk.
//!
//! ## Design Notes
//!
//! - **Naming**: `<sanitized id>-<16 hex of sha256(id)>.<ext>`. Sanitizing
//!   alone is lossy (`a/b` and `a_b` collide), the hash suffix keeps names
//!   unique per record id. Only the last 64 characters of the sanitized id
//!   are kept, so deep library paths stay within file name limits.
//! - **Atomic writes**: bytes go to `<name>.part` and are renamed into place,
//!   so a crash never leaves a truncated payload under the final name.
//! - **Scoped lifetime**: the returned [`StagedPayload`] deletes its file on
//!   drop, whether the upload succeeded or not.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use photosync_core::domain::{MediaKind, RecordId, SyncRecord};
use photosync_core::ports::{AssetProvider, StagedPayload};

use crate::SyncError;

/// Hex characters of the id hash kept in staged file names
const HASH_PREFIX_LEN: usize = 16;

/// Longest sanitized id kept in staged file names
const MAX_READABLE_LEN: usize = 64;

/// Builds the collision-free staging file name for a record
pub fn staging_file_name(id: &RecordId, kind: MediaKind) -> String {
    let sanitized: String = id
        .as_str()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // Sanitized names are ASCII, so any byte offset is a char boundary
    let readable = &sanitized[sanitized.len().saturating_sub(MAX_READABLE_LEN)..];

    let digest = Sha256::digest(id.as_str().as_bytes());
    let hash: String = digest
        .iter()
        .take(HASH_PREFIX_LEN / 2)
        .map(|b| format!("{b:02x}"))
        .collect();

    format!("{readable}-{hash}.{}", kind.staging_extension())
}

/// Stages asset payloads into a dedicated directory
#[derive(Clone)]
pub struct PayloadMaterializer {
    assets: Arc<dyn AssetProvider>,
    staging_dir: PathBuf,
}

impl PayloadMaterializer {
    pub fn new(assets: Arc<dyn AssetProvider>, staging_dir: impl Into<PathBuf>) -> Self {
        Self {
            assets,
            staging_dir: staging_dir.into(),
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Fetches the record's bytes and writes them to the staging area
    ///
    /// # Errors
    ///
    /// - `SyncError::AssetUnavailable` if the library no longer has the
    ///   asset or fails to read it
    /// - `SyncError::StagingFailure` if the staged file cannot be written
    #[instrument(skip(self, record), fields(record_id = %record.id()))]
    pub async fn materialize(&self, record: &SyncRecord) -> Result<StagedPayload, SyncError> {
        let bytes = match self.assets.fetch_bytes(record.id()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                return Err(SyncError::AssetUnavailable(format!(
                    "{} is no longer in the library",
                    record.id()
                )))
            }
            Err(e) => return Err(SyncError::AssetUnavailable(format!("{e:#}"))),
        };

        let name = staging_file_name(record.id(), record.media_kind());
        let target = self.staging_dir.join(&name);
        let partial = self.staging_dir.join(format!("{name}.part"));

        let write = async {
            tokio::fs::create_dir_all(&self.staging_dir).await?;
            tokio::fs::write(&partial, &bytes).await?;
            tokio::fs::rename(&partial, &target).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(SyncError::StagingFailure(format!(
                "{}: {e}",
                target.display()
            )));
        }

        debug!(path = %target.display(), bytes = bytes.len(), "Payload staged");
        Ok(StagedPayload::new(
            record.id().clone(),
            target,
            record.media_kind(),
            bytes.len() as u64,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use photosync_core::ports::AssetDescriptor;

    struct OneAsset;

    #[async_trait::async_trait]
    impl AssetProvider for OneAsset {
        async fn list_assets(
            &self,
            _offset: usize,
            _limit: usize,
        ) -> anyhow::Result<Vec<AssetDescriptor>> {
            Ok(Vec::new())
        }

        async fn fetch_bytes(&self, id: &RecordId) -> anyhow::Result<Option<Vec<u8>>> {
            match id.as_str() {
                "broken" => anyhow::bail!("permission denied"),
                "present" | "a/b" => Ok(Some(b"pixels".to_vec())),
                long if long.ends_with("IMG_0001.jpg") => Ok(Some(b"pixels".to_vec())),
                _ => Ok(None),
            }
        }
    }

    fn record(id: &str) -> SyncRecord {
        SyncRecord::new(RecordId::new(id).unwrap(), Utc::now(), MediaKind::Image)
    }

    #[test]
    fn test_file_name_sanitizes_and_hashes() {
        let name = staging_file_name(&RecordId::new("DCIM/IMG 0001.HEIC").unwrap(), MediaKind::Image);
        assert!(name.starts_with("DCIM_IMG_0001.HEIC-"));
        assert!(name.ends_with(".jpg"));
        let hash = name
            .trim_start_matches("DCIM_IMG_0001.HEIC-")
            .trim_end_matches(".jpg");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_name_unique_after_sanitizing() {
        let a = staging_file_name(&RecordId::new("a/b").unwrap(), MediaKind::Video);
        let b = staging_file_name(&RecordId::new("a_b").unwrap(), MediaKind::Video);
        assert_ne!(a, b);
        assert!(a.ends_with(".mp4"));
    }

    fn deep_id() -> String {
        let mut id = String::from("Camera Uploads/2024");
        while id.len() < 280 {
            id.push_str("/Trip to the mountains with friends");
        }
        id.push_str("/IMG_0001.jpg");
        id
    }

    #[test]
    fn test_file_name_bounded_for_long_ids() {
        let id = RecordId::new(deep_id()).unwrap();
        assert!(id.as_str().len() > 300);

        let name = staging_file_name(&id, MediaKind::Image);
        assert_eq!(name.len(), MAX_READABLE_LEN + 1 + HASH_PREFIX_LEN + ".jpg".len());
        assert!(name.contains("IMG_0001.jpg-"));

        // Same tail, different head: still distinct
        let other = RecordId::new(format!("Backup/{}", deep_id())).unwrap();
        assert_ne!(staging_file_name(&other, MediaKind::Image), name);
    }

    #[tokio::test]
    async fn test_materialize_long_id() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = PayloadMaterializer::new(Arc::new(OneAsset), dir.path());

        let staged = materializer.materialize(&record(&deep_id())).await.unwrap();
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"pixels");
    }

    #[tokio::test]
    async fn test_materialize_writes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let staging = dir.path().join("staging");
        let materializer = PayloadMaterializer::new(Arc::new(OneAsset), &staging);

        let staged = materializer.materialize(&record("a/b")).await.unwrap();
        assert_eq!(staged.size_bytes(), 6);
        assert_eq!(std::fs::read(staged.path()).unwrap(), b"pixels");
        assert!(!staged.path().with_extension("jpg.part").exists());

        let path = staged.path().to_path_buf();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_materialize_missing_asset() {
        let dir = tempfile::tempdir().unwrap();
        let materializer = PayloadMaterializer::new(Arc::new(OneAsset), dir.path());

        let err = materializer.materialize(&record("gone")).await.unwrap_err();
        assert!(matches!(err, SyncError::AssetUnavailable(_)));
        let err = materializer.materialize(&record("broken")).await.unwrap_err();
        assert!(matches!(err, SyncError::AssetUnavailable(ref m) if m.contains("permission denied")));
    }

    #[tokio::test]
    async fn test_materialize_unwritable_staging_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();
        let materializer = PayloadMaterializer::new(Arc::new(OneAsset), blocker.join("staging"));

        let err = materializer.materialize(&record("present")).await.unwrap_err();
        assert!(matches!(err, SyncError::StagingFailure(_)));
    }
}
