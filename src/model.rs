//! Data model shared by every component.
//!
//! All types are plain serializable values. Live provider objects are
//! never stored here: only the configuration needed to rebuild them
//! through the registry factories.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Descriptive metadata for one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderMeta {
    /// Stable provider type identifier, unique within its family.
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name, localized for the active locale.
    pub name: String,
    pub icon: String,
    pub home_page: String,
}

/// Which note-service backends an image host can be attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "types")]
pub enum Compatibility {
    /// Usable with every backend.
    Any,
    /// Usable only with the listed backend types.
    Only(BTreeSet<String>),
}

impl Compatibility {
    pub fn supports(&self, backend_type: &str) -> bool {
        match self {
            Compatibility::Any => true,
            Compatibility::Only(types) => types.contains(backend_type),
        }
    }
}

/// Metadata for an image-hosting provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHostingMeta {
    #[serde(flatten)]
    pub meta: ProviderMeta,
    pub support: Compatibility,
}

/// A provider-specific storage target (folder, repository, channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub group_id: String,
    pub group_name: String,
}

/// Account information reported by a provider or the powerpack API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_page: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A verified note-service account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque provider credentials / form values.
    pub info: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_repository_id: Option<String>,
    #[serde(default)]
    pub image_hosting_ids: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_info: Option<UserInfo>,
}

/// A configured image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageHosting {
    /// Assigned by the provider factory; stable for identical config.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub info: Value,
    #[serde(default)]
    pub remark: String,
}

/// The persisted preference blob plus the lists loaded alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreference {
    pub image_hosting: Vec<ImageHosting>,
    pub show_line_number: bool,
    pub live_rendering: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_plugin_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account_id: Option<String>,
}

impl Default for UserPreference {
    fn default() -> Self {
        Self {
            image_hosting: Vec::new(),
            show_line_number: true,
            live_rendering: true,
            default_plugin_id: None,
            default_account_id: None,
        }
    }
}

/// Aggregate preference state. Never mutated in place: every transition
/// produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceState {
    pub locale: String,
    pub image_hosting: Vec<ImageHosting>,
    pub services_meta: BTreeMap<String, ProviderMeta>,
    pub image_hosting_services_meta: BTreeMap<String, ImageHostingMeta>,
    pub accounts: Vec<Account>,
    pub show_line_number: bool,
    pub live_rendering: bool,
    pub iconfont_url: String,
    pub iconfont_icons: Vec<String>,
    pub user_info: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_plugin_id: Option<String>,
}

impl PreferenceState {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            image_hosting: Vec::new(),
            services_meta: BTreeMap::new(),
            image_hosting_services_meta: BTreeMap::new(),
            accounts: Vec::new(),
            show_line_number: true,
            live_rendering: true,
            iconfont_url: String::new(),
            iconfont_icons: Vec::new(),
            user_info: None,
            access_token: None,
            default_plugin_id: None,
        }
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn image_hosting_by_id(&self, id: &str) -> Option<&ImageHosting> {
        self.image_hosting.iter().find(|h| h.id == id)
    }

    /// `(account id, image hosting id)` pairs referencing a host that
    /// is not in `image_hosting`. Always empty in a consistent state.
    pub fn dangling_image_hosting_refs(&self) -> Vec<(String, String)> {
        self.accounts
            .iter()
            .flat_map(|account| {
                account
                    .image_hosting_ids
                    .iter()
                    .filter(|id| self.image_hosting_by_id(id).is_none())
                    .map(|id| (account.id.clone(), id.clone()))
            })
            .collect()
    }
}

/// Raw image bytes moving between the tab, the sandbox and image hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlob {
    pub mime_type: String,
    pub data: bytes::Bytes,
}

/// Title and URL of the tab the clipper was opened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub title: String,
    pub url: String,
}

/// The slice of clipper state this core reads and writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipperState {
    pub current_account_id: Option<String>,
    /// Clip data per plugin route.
    pub clipper_data: BTreeMap<String, Value>,
    pub tab_info: Option<TabInfo>,
    /// Current route of the surrounding UI.
    pub route: String,
}

impl ClipperState {
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            current_account_id: None,
            clipper_data: BTreeMap::new(),
            tab_info: None,
            route: route.into(),
        }
    }
}

/// Root state owned by the store loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub user_preference: PreferenceState,
    pub clipper: ClipperState,
}

impl AppState {
    pub fn new(locale: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            user_preference: PreferenceState::new(locale),
            clipper: ClipperState::new(route),
        }
    }

    /// The account currently selected in the clipper, if any.
    pub fn current_account(&self) -> Option<&Account> {
        self.clipper
            .current_account_id
            .as_deref()
            .and_then(|id| self.user_preference.account(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hosting(id: &str) -> ImageHosting {
        ImageHosting {
            id: id.into(),
            kind: "imgX".into(),
            info: json!({}),
            remark: String::new(),
        }
    }

    fn account(id: &str, hosts: &[&str]) -> Account {
        Account {
            id: id.into(),
            kind: "noteA".into(),
            info: json!({}),
            default_repository_id: None,
            image_hosting_ids: hosts.iter().map(|h| h.to_string()).collect(),
            user_info: None,
        }
    }

    #[test]
    fn compatibility_any_supports_everything() {
        assert!(Compatibility::Any.supports("noteA"));
        assert!(Compatibility::Any.supports(""));
    }

    #[test]
    fn compatibility_only_is_exact() {
        let c = Compatibility::Only(["noteB".to_string()].into());
        assert!(c.supports("noteB"));
        assert!(!c.supports("noteA"));
    }

    #[test]
    fn dangling_refs_detected() {
        let mut s = PreferenceState::new("en-US");
        s.image_hosting = vec![hosting("h1")];
        s.accounts = vec![account("a1", &["h1", "h2"])];
        assert_eq!(
            s.dangling_image_hosting_refs(),
            vec![("a1".to_string(), "h2".to_string())]
        );
    }

    #[test]
    fn consistent_state_has_no_dangling_refs() {
        let mut s = PreferenceState::new("en-US");
        s.image_hosting = vec![hosting("h1")];
        s.accounts = vec![account("a1", &["h1"])];
        assert!(s.dangling_image_hosting_refs().is_empty());
    }

    #[test]
    fn current_account_resolves_through_preference() {
        let mut s = AppState::new("en-US", "/");
        s.user_preference.accounts = vec![account("a1", &[])];
        assert!(s.current_account().is_none());
        s.clipper.current_account_id = Some("a1".into());
        assert_eq!(s.current_account().unwrap().id, "a1");
    }

    #[test]
    fn account_serializes_with_type_key() {
        let value = serde_json::to_value(account("a1", &["h1"])).unwrap();
        assert_eq!(value["type"], "noteA");
        assert_eq!(value["imageHostingIds"], json!(["h1"]));
    }
}
