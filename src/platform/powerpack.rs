//! PowerpackApi trait - the account server behind the access token.

use async_trait::async_trait;

use super::PlatformError;
use crate::model::{ImageBlob, UserInfo};

#[async_trait]
pub trait PowerpackApi: Send + Sync {
    /// User info for the session identified by `access_token`.
    async fn user_info(&self, access_token: &str) -> Result<UserInfo, PlatformError>;

    /// Recognize the text in `image`.
    async fn ocr(&self, access_token: &str, image: &ImageBlob) -> Result<String, PlatformError>;
}
