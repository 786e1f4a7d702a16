//! Typed access to the preference keys.
//!
//! Every list-mutating method returns the complete new list so callers
//! can replace their copy wholesale.
//!
//! Read-modify-write sections hold `writes` from the first read to the
//! last write. Gateway calls may suspend, and concurrent handlers would
//! otherwise overwrite each other's lists.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::model::{Account, ImageHosting, UserPreference};

use super::{
    ACCESS_TOKEN_KEY, ACCOUNTS_KEY, DEFAULT_ACCOUNT_KEY, IMAGE_HOSTING_KEY, LOCALE_KEY,
    PREFERENCE_KEY, StorageError, StorageGateway, get_or, get_typed, set_typed,
};

/// Flags persisted under [`PREFERENCE_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFlags {
    #[serde(default = "enabled")]
    show_line_number: bool,
    #[serde(default = "enabled")]
    live_rendering: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_plugin_id: Option<String>,
}

fn enabled() -> bool {
    true
}

impl Default for StoredFlags {
    fn default() -> Self {
        Self {
            show_line_number: true,
            live_rendering: true,
            default_plugin_id: None,
        }
    }
}

#[derive(Clone)]
pub struct PreferenceRepository {
    storage: Arc<dyn StorageGateway>,
    writes: Arc<Mutex<()>>,
}

impl PreferenceRepository {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self {
            storage,
            writes: Arc::new(Mutex::new(())),
        }
    }

    pub fn gateway(&self) -> &Arc<dyn StorageGateway> {
        &self.storage
    }

    // -- Preference blob --

    pub async fn load_preference(&self) -> Result<UserPreference, StorageError> {
        let flags = self.flags().await?;
        Ok(UserPreference {
            image_hosting: self.image_hosting().await?,
            show_line_number: flags.show_line_number,
            live_rendering: flags.live_rendering,
            default_plugin_id: flags.default_plugin_id,
            default_account_id: self.default_account_id().await?,
        })
    }

    async fn flags(&self) -> Result<StoredFlags, StorageError> {
        get_or(self.storage.as_ref(), PREFERENCE_KEY, StoredFlags::default()).await
    }

    pub async fn set_show_line_number(&self, value: bool) -> Result<(), StorageError> {
        let _writes = self.writes.lock().await;
        let mut flags = self.flags().await?;
        flags.show_line_number = value;
        set_typed(self.storage.as_ref(), PREFERENCE_KEY, &flags).await
    }

    pub async fn set_live_rendering(&self, value: bool) -> Result<(), StorageError> {
        let _writes = self.writes.lock().await;
        let mut flags = self.flags().await?;
        flags.live_rendering = value;
        set_typed(self.storage.as_ref(), PREFERENCE_KEY, &flags).await
    }

    pub async fn default_account_id(&self) -> Result<Option<String>, StorageError> {
        get_typed(self.storage.as_ref(), DEFAULT_ACCOUNT_KEY).await
    }

    // -- Locale / token --

    pub async fn locale(&self) -> Result<Option<String>, StorageError> {
        get_typed(self.storage.as_ref(), LOCALE_KEY).await
    }

    pub async fn set_locale(&self, locale: &str) -> Result<(), StorageError> {
        set_typed(self.storage.as_ref(), LOCALE_KEY, &locale).await
    }

    pub async fn access_token(&self) -> Result<Option<String>, StorageError> {
        get_typed(self.storage.as_ref(), ACCESS_TOKEN_KEY).await
    }

    pub async fn set_access_token(&self, token: &str) -> Result<(), StorageError> {
        set_typed(self.storage.as_ref(), ACCESS_TOKEN_KEY, &token).await
    }

    // -- Image hosting --

    pub async fn image_hosting(&self) -> Result<Vec<ImageHosting>, StorageError> {
        get_or(self.storage.as_ref(), IMAGE_HOSTING_KEY, Vec::new()).await
    }

    /// Add a host. A host whose id is already present replaces the
    /// existing entry in place instead of being appended again.
    pub async fn add_image_hosting(
        &self,
        hosting: ImageHosting,
    ) -> Result<Vec<ImageHosting>, StorageError> {
        let _writes = self.writes.lock().await;
        let mut list = self.image_hosting().await?;
        match list.iter_mut().find(|h| h.id == hosting.id) {
            Some(existing) => *existing = hosting,
            None => list.push(hosting),
        }
        set_typed(self.storage.as_ref(), IMAGE_HOSTING_KEY, &list).await?;
        Ok(list)
    }

    pub async fn edit_image_hosting_by_id(
        &self,
        id: &str,
        hosting: ImageHosting,
    ) -> Result<Vec<ImageHosting>, StorageError> {
        let _writes = self.writes.lock().await;
        let mut list = self.image_hosting().await?;
        let slot = list
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| StorageError::NotFound {
                kind: "image hosting",
                id: id.to_string(),
            })?;
        *slot = ImageHosting {
            id: id.to_string(),
            ..hosting
        };
        set_typed(self.storage.as_ref(), IMAGE_HOSTING_KEY, &list).await?;
        Ok(list)
    }

    /// Delete a host and detach it from every account.
    ///
    /// Accounts are written first so no intermediate persisted state
    /// references a host that is already gone.
    pub async fn delete_image_hosting_by_id(
        &self,
        id: &str,
    ) -> Result<(Vec<ImageHosting>, Vec<Account>), StorageError> {
        let _writes = self.writes.lock().await;
        let mut accounts = self.accounts().await?;
        let detached = accounts
            .iter_mut()
            .map(|a| a.image_hosting_ids.remove(id))
            .fold(false, |acc, removed| acc || removed);
        if detached {
            self.save_accounts(&accounts).await?;
        }

        let mut list = self.image_hosting().await?;
        list.retain(|h| h.id != id);
        set_typed(self.storage.as_ref(), IMAGE_HOSTING_KEY, &list).await?;
        Ok((list, accounts))
    }

    // -- Accounts --

    pub async fn accounts(&self) -> Result<Vec<Account>, StorageError> {
        get_or(self.storage.as_ref(), ACCOUNTS_KEY, Vec::new()).await
    }

    /// Apply `update` to the persisted accounts and save the result.
    ///
    /// `update` also sees the persisted image-hosting list, read under
    /// the same lock, so host references are checked against what a
    /// concurrent delete has already removed. Nothing is written when
    /// `update` fails.
    pub async fn update_accounts<E>(
        &self,
        update: impl FnOnce(&mut Vec<Account>, &[ImageHosting]) -> Result<(), E>,
    ) -> Result<Vec<Account>, E>
    where
        E: From<StorageError>,
    {
        let _writes = self.writes.lock().await;
        let mut accounts = self.accounts().await?;
        let hosts = self.image_hosting().await?;
        update(&mut accounts, &hosts)?;
        self.save_accounts(&accounts).await?;
        Ok(accounts)
    }

    async fn save_accounts(&self, accounts: &[Account]) -> Result<(), StorageError> {
        set_typed(self.storage.as_ref(), ACCOUNTS_KEY, &accounts).await
    }
}
