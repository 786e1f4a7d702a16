//! ClipboardWriter trait and the xclip-backed adapter.

use async_trait::async_trait;

use super::PlatformError;

/// Writes text to the system clipboard.
#[async_trait]
pub trait ClipboardWriter: Send + Sync {
    async fn write_text(&self, text: &str) -> Result<(), PlatformError>;
}

/// Clipboard adapter that pipes into `xclip -selection clipboard`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XclipClipboard;

#[async_trait]
impl ClipboardWriter for XclipClipboard {
    async fn write_text(&self, text: &str) -> Result<(), PlatformError> {
        use tokio::io::AsyncWriteExt;
        use tokio::process::Command;

        let mut child = Command::new("xclip")
            .args(["-selection", "clipboard"])
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            // Dropping stdin closes the pipe so xclip can exit.
        }

        let status = child.wait().await?;
        if status.success() {
            tracing::debug!(bytes = text.len(), "clipboard written");
            Ok(())
        } else {
            Err(PlatformError::Failed(format!("xclip exited with {status}")))
        }
    }
}
