//! Directory-backed asset provider (secondary/driven adapter)
//!
//! Implements [`AssetProvider`] over a directory tree: every regular file
//! under the library root is an asset.
//!
//! ## Design Decisions
//!
//! - **Ids** are root-relative paths with `/` separators, so they are stable
//!   across runs and readable in logs.
//! - **Creation date** is the file's modified time; files whose time cannot
//!   be read are listed without a date and skipped by ingestion.
//! - **Hidden entries** (leading `.`) are ignored, as are staging leftovers.
//! - **Traversal** runs on a blocking thread via `spawn_blocking`; the
//!   listing is sorted so paging with `offset`/`limit` is stable.
//! - **Snapshots**: a page at offset 0 walks the tree and keeps the sorted
//!   listing; later pages are cut from that snapshot, so one ingest walks
//!   the tree once.
//! - **Non-UTF-8 names** are skipped: their ids could not be mapped back to
//!   the file.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use photosync_core::domain::{MediaKind, RecordId};
use photosync_core::ports::{AssetDescriptor, AssetProvider};

/// Asset provider reading a local directory tree
#[derive(Debug)]
pub struct DirectoryAssetProvider {
    root: PathBuf,
    /// Sorted listing taken by the last page at offset 0
    snapshot: Mutex<Option<Arc<Vec<AssetDescriptor>>>>,
}

impl DirectoryAssetProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            snapshot: Mutex::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock_snapshot(&self) -> std::sync::MutexGuard<'_, Option<Arc<Vec<AssetDescriptor>>>> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Walks the whole tree, returning assets sorted by id
    async fn walk(&self) -> anyhow::Result<Vec<AssetDescriptor>> {
        let root = self.root.clone();
        let mut assets = tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            walk_directory(&root, &root, &mut out).map(|_| out)
        })
        .await?
        .with_context(|| format!("Failed to list library {}", self.root.display()))?;

        assets.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(total = assets.len(), "Walked library");
        Ok(assets)
    }

    /// Maps an asset id back to a path under the root
    ///
    /// Returns `None` for ids that would escape the root.
    fn resolve(&self, id: &RecordId) -> Option<PathBuf> {
        let relative = Path::new(id.as_str());
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        safe.then(|| self.root.join(relative))
    }
}

/// Walks `dir` recursively, collecting files as root-relative ids
fn walk_directory(root: &Path, dir: &Path, out: &mut Vec<AssetDescriptor>) -> std::io::Result<()> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name.ends_with(".part") {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_directory(root, &path, out)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let Some(id) = relative_id(root, &path) else {
            continue;
        };
        let created_at = entry
            .metadata()
            .ok()
            .and_then(|m| m.modified().ok())
            .map(DateTime::<Utc>::from);
        let media_kind = path
            .extension()
            .map(|ext| MediaKind::from_extension(&ext.to_string_lossy()))
            .unwrap_or_default();

        out.push(AssetDescriptor {
            id,
            created_at,
            media_kind,
        });
    }
    Ok(())
}

fn relative_id(root: &Path, path: &Path) -> Option<RecordId> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    let Some(parts) = parts else {
        debug!(path = %path.display(), "Skipping file with a non-UTF-8 path");
        return None;
    };
    RecordId::new(parts.join("/")).ok()
}

#[async_trait::async_trait]
impl AssetProvider for DirectoryAssetProvider {
    #[instrument(skip(self), fields(root = %self.root.display()))]
    async fn list_assets(
        &self,
        offset: usize,
        limit: usize,
    ) -> anyhow::Result<Vec<AssetDescriptor>> {
        let cached = if offset == 0 {
            None
        } else {
            self.lock_snapshot().clone()
        };
        let assets = match cached {
            Some(assets) => assets,
            None => {
                let assets = Arc::new(self.walk().await?);
                *self.lock_snapshot() = Some(assets.clone());
                assets
            }
        };

        let page: Vec<AssetDescriptor> = assets.iter().skip(offset).take(limit).cloned().collect();
        debug!(count = page.len(), "Listed assets");
        Ok(page)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn fetch_bytes(&self, id: &RecordId) -> anyhow::Result<Option<Vec<u8>>> {
        let Some(path) = self.resolve(id) else {
            debug!("Id escapes the library root");
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn library() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("2024/03")).unwrap();
        std::fs::write(dir.path().join("2024/03/beach.JPG"), b"jpeg").unwrap();
        std::fs::write(dir.path().join("2024/03/clip.mov"), b"video").unwrap();
        std::fs::write(dir.path().join("memo.m4a"), b"audio").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), b"junk").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_assets_sorted_relative_ids() {
        let dir = library();
        let provider = DirectoryAssetProvider::new(dir.path());

        let assets = provider.list_assets(0, 100).await.unwrap();
        let ids: Vec<&str> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2024/03/beach.JPG", "2024/03/clip.mov", "memo.m4a"]);
        assert_eq!(assets[0].media_kind, MediaKind::Image);
        assert_eq!(assets[1].media_kind, MediaKind::Video);
        assert_eq!(assets[2].media_kind, MediaKind::Audio);
        assert!(assets.iter().all(|a| a.created_at.is_some()));
    }

    #[tokio::test]
    async fn test_list_assets_pages() {
        let dir = library();
        let provider = DirectoryAssetProvider::new(dir.path());

        let first = provider.list_assets(0, 2).await.unwrap();
        let second = provider.list_assets(2, 2).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.as_str(), "memo.m4a");
        assert!(provider.list_assets(3, 2).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_later_pages_reuse_the_snapshot() {
        let dir = library();
        let provider = DirectoryAssetProvider::new(dir.path());

        let first = provider.list_assets(0, 2).await.unwrap();
        assert_eq!(first.len(), 2);

        // Added after the first page: not part of this listing
        std::fs::write(dir.path().join("zz-late.jpg"), b"late").unwrap();
        let second = provider.list_assets(2, 10).await.unwrap();
        let ids: Vec<&str> = second.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["memo.m4a"]);

        // A new listing from offset 0 sees it
        let fresh = provider.list_assets(0, 10).await.unwrap();
        assert_eq!(fresh.len(), 4);
        assert_eq!(fresh[3].id.as_str(), "zz-late.jpg");
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_non_utf8_names_are_skipped() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = library();
        std::fs::write(dir.path().join(OsStr::from_bytes(b"bad\xff.jpg")), b"x").unwrap();
        let provider = DirectoryAssetProvider::new(dir.path());

        let assets = provider.list_assets(0, 100).await.unwrap();
        assert_eq!(assets.len(), 3);
        assert!(assets.iter().all(|a| !a.id.as_str().contains('\u{fffd}')));
    }

    #[tokio::test]
    async fn test_list_assets_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let provider = DirectoryAssetProvider::new(dir.path().join("nope"));
        assert!(provider.list_assets(0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_bytes() {
        let dir = library();
        let provider = DirectoryAssetProvider::new(dir.path());

        let id = RecordId::new("2024/03/beach.JPG").unwrap();
        assert_eq!(provider.fetch_bytes(&id).await.unwrap(), Some(b"jpeg".to_vec()));

        let gone = RecordId::new("2024/03/deleted.jpg").unwrap();
        assert_eq!(provider.fetch_bytes(&gone).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_bytes_rejects_escaping_ids() {
        let dir = library();
        let provider = DirectoryAssetProvider::new(dir.path().join("2024"));

        let id = RecordId::new("../memo.m4a").unwrap();
        assert_eq!(provider.fetch_bytes(&id).await.unwrap(), None);
    }
}
