use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};

/// Content-addressed blob storage for pipeline intermediate files, keyed by
/// hierarchical strings of the form `<index>/<document_id>/<artifact_name>`.
///
/// `put` is atomic per key. `get` fails with `StoreError::NotFound` when the
/// key is absent. `delete` removes every key under `prefix` and is idempotent.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn exists(&self, key: &str) -> Result<bool>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, prefix: &str) -> Result<()>;
}

/// In-memory artifact store, backed by a `RwLock`-guarded map. The reference
/// implementation used by tests and as the default single-process backend.
#[derive(Clone, Default)]
pub struct InMemoryArtifactStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    #[instrument(skip(self, bytes))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let blobs = self.blobs.read().await;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let blobs = self.blobs.read().await;
        Ok(blobs
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    #[instrument(skip(self))]
    async fn delete(&self, prefix: &str) -> Result<()> {
        let mut blobs = self.blobs.write().await;
        blobs.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

/// Filesystem-backed artifact store. Keys map directly onto relative paths
/// under `root`. `put` writes to a sibling temp file and renames it into
/// place so readers never observe a partial write.
#[derive(Clone)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn walk(&self, prefix_path: &Path, out: &mut Vec<String>) -> Result<()> {
        let mut entries = match fs::read_dir(prefix_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                Box::pin(self.walk(&path, out)).await?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                out.push(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    #[instrument(skip(self, bytes))]
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut tmp_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        tmp_name.push(".tmp");
        let tmp_path = path.with_file_name(tmp_name);
        fs::write(&tmp_path, &bytes).await?;
        fs::rename(&tmp_path, &path).await?;
        debug!(%key, bytes = bytes.len(), "wrote artifact");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        fs::read(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StoreError::NotFound(key.to_string()),
                _ => StoreError::Io(e),
            })
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(fs::metadata(self.path_for(key)).await.is_ok())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.walk(&self.root.join(prefix), &mut out).await?;
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn delete(&self, prefix: &str) -> Result<()> {
        let path = self.root.join(prefix);
        match fs::remove_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                // prefix may address a single file rather than a directory.
                match fs::remove_file(&path).await {
                    Ok(()) => Ok(()),
                    Err(e2) if e2.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(_) => Err(e.into()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_put_get_roundtrip() {
        let store = InMemoryArtifactStore::new();
        store.put("idx/doc/source.0.txt", b"hello".to_vec()).await.unwrap();

        let bytes = store.get("idx/doc/source.0.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_in_memory_get_missing_is_not_found() {
        let store = InMemoryArtifactStore::new();
        let err = store.get("idx/doc/missing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_in_memory_delete_prefix_is_recursive_and_idempotent() {
        let store = InMemoryArtifactStore::new();
        store.put("idx/doc/a.txt", b"a".to_vec()).await.unwrap();
        store.put("idx/doc/b.txt", b"b".to_vec()).await.unwrap();
        store.put("idx/other/c.txt", b"c".to_vec()).await.unwrap();

        store.delete("idx/doc/").await.unwrap();
        assert!(store.list("idx/doc/").await.unwrap().is_empty());
        assert_eq!(store.list("idx/other/").await.unwrap().len(), 1);

        // idempotent: deleting again is a no-op, not an error.
        store.delete("idx/doc/").await.unwrap();
    }

    #[tokio::test]
    async fn test_filesystem_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemArtifactStore::new(dir.path());

        store.put("idx/doc/source.0.txt", b"hello".to_vec()).await.unwrap();
        let bytes = store.get("idx/doc/source.0.txt").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn test_filesystem_get_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemArtifactStore::new(dir.path());

        let err = store.get("idx/doc/missing.txt").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_filesystem_list_and_delete_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemArtifactStore::new(dir.path());

        store.put("idx/doc/a.txt", b"a".to_vec()).await.unwrap();
        store.put("idx/doc/b.txt", b"b".to_vec()).await.unwrap();

        let listed = store.list("idx/doc").await.unwrap();
        assert_eq!(listed.len(), 2);

        store.delete("idx/doc").await.unwrap();
        assert!(store.list("idx/doc").await.unwrap().is_empty());

        // deleting an already-absent prefix does not error.
        store.delete("idx/doc").await.unwrap();
    }
}
