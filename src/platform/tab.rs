//! TabBridge trait - messaging with the page the clipper is attached to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PlatformError;
use crate::model::ImageBlob;

/// Commands delivered to the content script of the current tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "payload")]
pub enum TabCommand {
    /// Execute opaque script text in the page and return its output.
    RunScript(String),
    HideTool,
    RemoveTool,
}

/// What the browser reports about the current tab. Either field may be
/// missing for privileged pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabSnapshot {
    pub title: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait TabBridge: Send + Sync {
    /// The current tab, or `None` when the clipper is not attached to one.
    async fn current_tab(&self) -> Result<Option<TabSnapshot>, PlatformError>;

    /// Send a command to the current tab. `RunScript` returns the raw
    /// script output; the other commands return `Value::Null`.
    async fn send(&self, command: TabCommand) -> Result<Value, PlatformError>;

    async fn capture_visible_tab(&self) -> Result<ImageBlob, PlatformError>;

    async fn close_current_tab(&self) -> Result<(), PlatformError>;
}
