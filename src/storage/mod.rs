//! Storage gateway - key/value persistence with change notifications.
//!
//! The gateway itself is an external collaborator: this module only
//! defines the interface the store consumes, two reference gateways
//! (in-memory and MessagePack file), and typed helpers over the keys
//! the preference store reads and writes.
//!
//! Individual gateway calls are atomic. Nothing here assumes
//! transactions spanning more than one call.

pub mod file;
pub mod memory;
pub mod preference;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use preference::PreferenceRepository;

/// Persisted UI locale.
pub const LOCALE_KEY: &str = "local.userPreference.locale";
/// Persisted powerpack access token.
pub const ACCESS_TOKEN_KEY: &str = "local.userPreference.accessToken";
/// Preference flag blob.
pub const PREFERENCE_KEY: &str = "userPreference";
/// Account list.
pub const ACCOUNTS_KEY: &str = "accounts";
/// Image-hosting list.
pub const IMAGE_HOSTING_KEY: &str = "imageHosting";
/// Account activated at startup.
pub const DEFAULT_ACCOUNT_KEY: &str = "defaultAccountId";

/// Capacity of the change-notification channel of the bundled gateways.
pub(crate) const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Storage gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("MessagePack encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("MessagePack decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("malformed value under {key}: {source}")]
    Malformed {
        key: String,
        source: serde_json::Error,
    },
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Key/value persistence consumed by the store.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Read a key. `None` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a key. Every successful write is announced on the change
    /// channel.
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Subscribe to the keys changed by any writer.
    fn subscribe(&self) -> broadcast::Receiver<String>;
}

/// Read a key and decode it, or return `default` when absent.
pub async fn get_or<T: DeserializeOwned>(
    storage: &dyn StorageGateway,
    key: &str,
    default: T,
) -> Result<T, StorageError> {
    Ok(get_typed(storage, key).await?.unwrap_or(default))
}

/// Read a key and decode it.
pub async fn get_typed<T: DeserializeOwned>(
    storage: &dyn StorageGateway,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match storage.get(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Malformed {
                key: key.to_string(),
                source,
            }),
    }
}

/// Encode a value and write it under `key`.
pub async fn set_typed<T: Serialize>(
    storage: &dyn StorageGateway,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(|source| StorageError::Malformed {
        key: key.to_string(),
        source,
    })?;
    storage.set(key, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_or_falls_back_on_missing_key() {
        let storage = MemoryStorage::new();
        let locale: String = get_or(&storage, LOCALE_KEY, "en-US".to_string())
            .await
            .unwrap();
        assert_eq!(locale, "en-US");
    }

    #[tokio::test]
    async fn get_or_treats_null_as_missing() {
        let storage = MemoryStorage::new();
        storage.set(LOCALE_KEY, Value::Null).await.unwrap();
        let locale: String = get_or(&storage, LOCALE_KEY, "en-US".to_string())
            .await
            .unwrap();
        assert_eq!(locale, "en-US");
    }

    #[tokio::test]
    async fn typed_round_trip() {
        let storage = MemoryStorage::new();
        set_typed(&storage, LOCALE_KEY, &"zh-CN").await.unwrap();
        let locale: Option<String> = get_typed(&storage, LOCALE_KEY).await.unwrap();
        assert_eq!(locale.as_deref(), Some("zh-CN"));
    }

    #[tokio::test]
    async fn malformed_value_reports_key() {
        let storage = MemoryStorage::new();
        storage.set(ACCOUNTS_KEY, json!("not a list")).await.unwrap();
        let err = get_typed::<Vec<crate::model::Account>>(&storage, ACCOUNTS_KEY)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(ACCOUNTS_KEY));
    }
}
