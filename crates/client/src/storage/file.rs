//! JSON file store.
//!
//! All keys live in one JSON object on disk. Every write rewrites the file
//! through a temporary sibling and a rename, so a crash mid-write leaves the
//! previous contents intact.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{LocalStore, StorageError};

/// File-backed store. Clones share the same file and lock.
#[derive(Debug, Clone)]
pub struct FileStore {
    inner: Arc<FileStoreInner>,
}

#[derive(Debug)]
struct FileStoreInner {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStore {
    /// Create a store backed by `path`. The file is created on first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            inner: Arc::new(FileStoreInner {
                path: path.as_ref().to_path_buf(),
                lock: Mutex::new(()),
            }),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    async fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.inner.path).await {
            Ok(raw) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let path = &self.inner.path;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(entries)?;
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), keys = entries.len(), "Storage file written");
        Ok(())
    }
}

impl LocalStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.inner.lock.lock().await;
        let mut entries = self.read_all().await?;
        Ok(entries.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.inner.lock.lock().await;
        let mut entries = self.read_all().await?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.inner.lock.lock().await;
        let mut entries = self.read_all().await?;
        if entries.remove(key).is_some() {
            self.write_all(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("bazaar-store-{}", uuid::Uuid::new_v4()))
            .join("storage.json")
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let store = FileStore::new(temp_path());
        assert_eq!(store.get("guestCartId").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_values_persist_across_instances() {
        let path = temp_path();
        let store = FileStore::new(&path);
        store.set("guestCartId", "abc123").await.unwrap();
        store.set("userId", "u1").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("guestCartId").await.unwrap().as_deref(),
            Some("abc123")
        );

        reopened.remove("userId").await.unwrap();
        assert_eq!(store.get("userId").await.unwrap(), None);

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let path = temp_path();
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(
            store.get("anything").await,
            Err(StorageError::Corrupt(_))
        ));

        tokio::fs::remove_dir_all(path.parent().unwrap()).await.unwrap();
    }
}
