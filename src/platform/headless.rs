//! Adapters for concerns that have no backing outside a browser.

use async_trait::async_trait;
use serde_json::Value;

use super::{PlatformError, PowerpackApi, TabBridge, TabCommand, TabSnapshot};
use crate::model::{ImageBlob, UserInfo};

/// No page attached. Every tab operation except `current_tab` fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTab;

#[async_trait]
impl TabBridge for NoTab {
    async fn current_tab(&self) -> Result<Option<TabSnapshot>, PlatformError> {
        Ok(None)
    }

    async fn send(&self, command: TabCommand) -> Result<Value, PlatformError> {
        tracing::debug!(?command, "no tab to deliver command to");
        Err(PlatformError::Unavailable("tab messaging"))
    }

    async fn capture_visible_tab(&self) -> Result<ImageBlob, PlatformError> {
        Err(PlatformError::Unavailable("tab capture"))
    }

    async fn close_current_tab(&self) -> Result<(), PlatformError> {
        Err(PlatformError::Unavailable("tab messaging"))
    }
}

/// No powerpack server configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPowerpack;

#[async_trait]
impl PowerpackApi for NoPowerpack {
    async fn user_info(&self, _access_token: &str) -> Result<UserInfo, PlatformError> {
        Err(PlatformError::Unavailable("powerpack"))
    }

    async fn ocr(&self, _access_token: &str, _image: &ImageBlob) -> Result<String, PlatformError> {
        Err(PlatformError::Unavailable("powerpack"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_tab_has_no_current_tab() {
        assert_eq!(NoTab.current_tab().await.unwrap(), None);
    }

    #[tokio::test]
    async fn no_tab_rejects_commands() {
        let err = NoTab.send(TabCommand::HideTool).await.unwrap_err();
        assert_eq!(err, PlatformError::Unavailable("tab messaging"));
    }

    #[tokio::test]
    async fn no_powerpack_rejects_lookup() {
        assert!(NoPowerpack.user_info("token").await.is_err());
    }
}
