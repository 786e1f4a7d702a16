//! In-memory storage gateway.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{CHANGE_CHANNEL_CAPACITY, StorageError, StorageGateway};

/// Process-local gateway. Used by tests and by the harness when no
/// storage file is given.
#[derive(Debug)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Value>>,
    changes: broadcast::Sender<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    /// Seed the gateway without emitting change notifications.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let storage = Self::new();
        if let Ok(mut map) = storage.entries.lock() {
            map.extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        }
        storage
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| StorageError::Unavailable("memory storage poisoned".into()))?;
            entries.insert(key.to_string(), value);
        }
        // No subscribers is fine.
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
    async fn missing_key_is_none() {
        let s = MemoryStorage::new();
        assert_eq!(s.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get() {
        let s = MemoryStorage::new();
        s.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(s.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn set_notifies_subscribers() {
        let s = MemoryStorage::new();
        let mut rx = s.subscribe();
        s.set("k", json!(true)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "k");
    }

    #[tokio::test]
    async fn seeded_entries_are_silent() {
        let s = MemoryStorage::with_entries([("k", json!(1))]);
        let mut rx = s.subscribe();
        assert_eq!(s.get("k").await.unwrap(), Some(json!(1)));
        assert!(rx.try_recv().is_err());
    }
}
