//! ImageLoader trait and the HTTP adapter.

use async_trait::async_trait;

use super::PlatformError;
use crate::model::ImageBlob;

#[async_trait]
pub trait ImageLoader: Send + Sync {
    /// Fetch the image at `url`.
    async fn load(&self, url: &str) -> Result<ImageBlob, PlatformError>;
}

#[derive(Debug, Clone)]
pub struct HttpImageLoader {
    client: reqwest::Client,
}

impl HttpImageLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageLoader for HttpImageLoader {
    async fn load(&self, url: &str) -> Result<ImageBlob, PlatformError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        if !mime_type.starts_with("image/") {
            return Err(PlatformError::Failed(format!(
                "{url} is not an image ({mime_type})"
            )));
        }
        let data = response.bytes().await?;
        tracing::debug!(url, %mime_type, bytes = data.len(), "image loaded");
        Ok(ImageBlob { mime_type, data })
    }
}
