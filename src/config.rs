//! Store configuration.

use serde::{Deserialize, Serialize};

use crate::locale::{DEFAULT_LOCALE, environment_locale};

/// Default resource host serving `config.json` and the changelogs.
pub const DEFAULT_RESOURCE_HOST: &str = "https://resource.clipper.website";

/// Default capacity of the notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub resource_host: String,
    /// Locale used when none is persisted.
    pub fallback_locale: String,
    /// Iconfont script used when the remote config is skipped or
    /// unreachable.
    pub bundled_iconfont_url: String,
    /// Icons used when the remote config is unreachable.
    pub bundled_icons: Vec<String>,
    /// `false` skips `config.json` and scans the bundled iconfont.
    pub fetch_remote_config: bool,
    /// Route of the surrounding UI at startup.
    pub initial_route: String,
    pub notification_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            resource_host: DEFAULT_RESOURCE_HOST.to_string(),
            fallback_locale: environment_locale().unwrap_or_else(|| DEFAULT_LOCALE.to_string()),
            bundled_iconfont_url: format!("{DEFAULT_RESOURCE_HOST}/iconfont.js"),
            bundled_icons: Vec::new(),
            fetch_remote_config: true,
            initial_route: "/".to_string(),
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.resource_host, DEFAULT_RESOURCE_HOST);
        assert_eq!(config.initial_route, "/");
        assert!(config.fetch_remote_config);
        assert!(!config.fallback_locale.is_empty());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: StoreConfig = serde_json::from_str(
            r#"{"resourceHost": "https://mirror.example", "fetchRemoteConfig": false}"#,
        )
        .unwrap();
        assert_eq!(config.resource_host, "https://mirror.example");
        assert!(!config.fetch_remote_config);
        assert_eq!(config.notification_capacity, DEFAULT_NOTIFICATION_CAPACITY);
    }
}
