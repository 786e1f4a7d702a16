//! File-backed storage gateway.
//!
//! The whole key space is one MessagePack map, rewritten on every
//! `set` through a temp file + rename so a crash never leaves a torn
//! blob behind.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, broadcast};

use super::{CHANGE_CHANNEL_CAPACITY, StorageError, StorageGateway};

#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
    changes: broadcast::Sender<String>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the file exists but cannot be read or
    /// decoded.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(raw) if raw.is_empty() => BTreeMap::new(),
            Ok(raw) => rmp_serde::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "storage file opened");
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            changes,
        })
    }

    async fn flush(&self, entries: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        let encoded = rmp_serde::to_vec_named(entries)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageGateway for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        let previous = entries.insert(key.to_string(), value);
        if let Err(e) = self.flush(&entries).await {
            // Keep memory in line with disk.
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }
        drop(entries);
        let _ = self.changes.send(key.to_string());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path().join("store.mpk")).await.unwrap();
        assert_eq!(s.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mpk");
        {
            let s = FileStorage::open(&path).await.unwrap();
            s.set("locale", json!("zh-CN")).await.unwrap();
            s.set("flags", json!({"showLineNumber": false})).await.unwrap();
        }
        let s = FileStorage::open(&path).await.unwrap();
        assert_eq!(s.get("locale").await.unwrap(), Some(json!("zh-CN")));
        assert_eq!(
            s.get("flags").await.unwrap(),
            Some(json!({"showLineNumber": false}))
        );
    }

    #[tokio::test]
    async fn nested_parent_directories_are_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("store.mpk");
        let s = FileStorage::open(&path).await.unwrap();
        s.set("k", json!(1)).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn garbage_file_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.mpk");
        tokio::fs::write(&path, [0xc1u8, 0xc1, 0xc1]).await.unwrap();
        let err = FileStorage::open(&path).await.unwrap_err();
        assert!(matches!(err, StorageError::Decode(_)));
    }

    #[tokio::test]
    async fn set_notifies_subscribers() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path().join("store.mpk")).await.unwrap();
        let mut rx = s.subscribe();
        s.set("k", json!(1)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "k");
    }
}
