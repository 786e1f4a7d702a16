//! Tool sandbox - lifecycle scripts of "tool" extensions.
//!
//! A tool declares up to three scripts. `run` and `destroy` are opaque
//! text executed in the page through the tab bridge. `afterRun` is an
//! expression evaluated here, by a small interpreter whose only names
//! are the entries of the tool context:
//!
//! `locale`, `result`, `data`, `notify`, `imageService`, `loadImage`,
//! `captureVisibleTab`, `copyToClipboard`, `createAndDownloadFile`,
//! `pangu`, `ocr`, and `context` (an object holding all of the above).
//!
//! Every identifier is checked against that list before evaluation
//! starts, so a script naming anything else fails without running.
//!
//! Order is always `run`, `afterRun`, `destroy`. An `afterRun` failure
//! is reported and `destroy` still runs.

mod eval;
mod lexer;
pub mod pangu;
mod parser;
mod value;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

pub use value::{Capability, Value};

use crate::model::ImageBlob;
use crate::platform::{TabBridge, TabCommand};

/// Names visible to `afterRun`, besides `context`.
pub const CONTEXT_NAMES: &[&str] = &[
    "locale",
    "result",
    "data",
    "notify",
    "imageService",
    "loadImage",
    "captureVisibleTab",
    "copyToClipboard",
    "createAndDownloadFile",
    "pangu",
    "ocr",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    #[error("syntax error at {offset}: {message}")]
    Syntax { offset: usize, message: String },
    #[error("{0} is not defined")]
    UnknownIdentifier(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("{capability} failed: {message}")]
    Capability {
        capability: &'static str,
        message: String,
    },
    #[error("tab script failed: {0}")]
    Tab(String),
}

/// A tool extension's lifecycle scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExtension {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_run: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destroy: Option<String>,
}

/// Effects behind the context's capability functions.
#[async_trait]
pub trait ToolHost: Send + Sync {
    fn notify(&self, message: &str);

    /// Whether `imageService` is bound for this run.
    fn has_image_service(&self) -> bool;

    async fn load_image(&self, url: &str) -> Result<ImageBlob, SandboxError>;

    async fn capture_visible_tab(&self) -> Result<ImageBlob, SandboxError>;

    async fn copy_to_clipboard(&self, text: &str) -> Result<(), SandboxError>;

    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), SandboxError>;

    async fn ocr(&self, image: &ImageBlob) -> Result<String, SandboxError>;

    async fn upload_image(&self, image: &ImageBlob) -> Result<String, SandboxError>;
}

/// The scope an `afterRun` expression evaluates against.
pub fn tool_context(
    locale: &str,
    result: Value,
    data: Value,
    has_image_service: bool,
) -> BTreeMap<String, Value> {
    let image_service = if has_image_service {
        Value::Map(BTreeMap::from([(
            "upload".to_string(),
            Value::Function(Capability::UploadImage),
        )]))
    } else {
        Value::Null
    };
    let mut scope = BTreeMap::from([
        ("locale".to_string(), Value::String(locale.to_string())),
        ("result".to_string(), result),
        ("data".to_string(), data),
        ("notify".to_string(), Value::Function(Capability::Notify)),
        ("imageService".to_string(), image_service),
        ("loadImage".to_string(), Value::Function(Capability::LoadImage)),
        (
            "captureVisibleTab".to_string(),
            Value::Function(Capability::CaptureVisibleTab),
        ),
        (
            "copyToClipboard".to_string(),
            Value::Function(Capability::CopyToClipboard),
        ),
        (
            "createAndDownloadFile".to_string(),
            Value::Function(Capability::CreateAndDownloadFile),
        ),
        ("pangu".to_string(), Value::Function(Capability::Pangu)),
        ("ocr".to_string(), Value::Function(Capability::Ocr)),
    ]);
    let context = Value::Map(scope.clone());
    scope.insert("context".to_string(), context);
    scope
}

/// Parse, check, and evaluate `src` against `scope`.
pub async fn evaluate(
    src: &str,
    scope: &BTreeMap<String, Value>,
    host: &dyn ToolHost,
) -> Result<Value, SandboxError> {
    let expr = parser::parse(src)?;
    if let Some(name) = parser::free_identifiers(&expr)
        .into_iter()
        .find(|name| !scope.contains_key(name))
    {
        return Err(SandboxError::UnknownIdentifier(name));
    }
    eval::Evaluator::new(scope, host).eval(&expr).await
}

/// Runs tool lifecycles against one tab and one host.
pub struct ToolRunner<'a> {
    tab: &'a dyn TabBridge,
    host: &'a dyn ToolHost,
}

impl<'a> ToolRunner<'a> {
    pub fn new(tab: &'a dyn TabBridge, host: &'a dyn ToolHost) -> Self {
        Self { tab, host }
    }

    /// Run `run`, `afterRun`, `destroy` in order and return the last
    /// computed result as JSON.
    ///
    /// `data` is read after `run` completes. A `run` failure still
    /// attempts `destroy` and is returned as the error. `afterRun` and
    /// `destroy` failures are reported through the host and the result
    /// computed so far is returned.
    pub async fn run(
        &self,
        extension: &ToolExtension,
        locale: &str,
        data: impl FnOnce() -> Json,
    ) -> Result<Json, SandboxError> {
        let mut result = Value::Null;

        if let Some(script) = &extension.run {
            tracing::debug!(tool = %extension.id, "run");
            match self.tab.send(TabCommand::RunScript(script.clone())).await {
                Ok(output) => result = Value::from_json(&output),
                Err(e) => {
                    let err = SandboxError::Tab(e.to_string());
                    tracing::warn!(tool = %extension.id, error = %err, "run failed");
                    self.destroy(extension).await;
                    return Err(err);
                }
            }
        }

        if let Some(script) = &extension.after_run {
            tracing::debug!(tool = %extension.id, "afterRun");
            let scope = tool_context(
                locale,
                result.clone(),
                Value::from_json(&data()),
                self.host.has_image_service(),
            );
            match evaluate(script, &scope, self.host).await {
                Ok(value) => result = value,
                Err(e) => {
                    tracing::warn!(tool = %extension.id, error = %e, "afterRun failed");
                    self.host.notify(&e.to_string());
                }
            }
        }

        self.destroy(extension).await;
        Ok(result.to_json())
    }

    async fn destroy(&self, extension: &ToolExtension) {
        let Some(script) = &extension.destroy else {
            return;
        };
        tracing::debug!(tool = %extension.id, "destroy");
        if let Err(e) = self.tab.send(TabCommand::RunScript(script.clone())).await {
            tracing::warn!(tool = %extension.id, error = %e, "destroy failed");
            self.host.notify(&format!("destroy failed: {e}"));
        }
    }
}
