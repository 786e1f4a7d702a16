//! Remote config - iconfont location and the icon names it defines.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::PlatformError;

/// Body of `{resource_host}/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub iconfont: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

#[async_trait]
pub trait RemoteConfigSource: Send + Sync {
    async fn fetch_config(&self) -> Result<RemoteConfig, PlatformError>;

    /// Fetch the iconfont script text.
    async fn fetch_iconfont(&self, url: &str) -> Result<String, PlatformError>;
}

#[derive(Debug, Clone)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    resource_host: String,
}

impl HttpConfigSource {
    pub fn new(client: reqwest::Client, resource_host: impl Into<String>) -> Self {
        Self {
            client,
            resource_host: resource_host.into(),
        }
    }

    fn config_url(&self) -> String {
        format!("{}/config.json", self.resource_host.trim_end_matches('/'))
    }
}

#[async_trait]
impl RemoteConfigSource for HttpConfigSource {
    async fn fetch_config(&self) -> Result<RemoteConfig, PlatformError> {
        let url = self.config_url();
        let config = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<RemoteConfig>()
            .await?;
        tracing::debug!(%url, iconfont = %config.iconfont, "remote config fetched");
        Ok(config)
    }

    async fn fetch_iconfont(&self, url: &str) -> Result<String, PlatformError> {
        Ok(self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }
}

static ICON_ID: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"id="([A-Za-z]+)""#).ok());

/// Icon names declared in an iconfont script, in document order.
pub fn parse_icons(script: &str) -> Vec<String> {
    let Some(re) = ICON_ID.as_ref() else {
        return Vec::new();
    };
    re.captures_iter(script)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
