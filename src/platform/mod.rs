//! Platform collaborators - pluggable adapters for everything outside
//! the store.
//!
//! Tab messaging, clipboard, downloads, image loading, the powerpack
//! account API and the remote config endpoint are each a small async
//! trait. The store receives them composed into a [`PlatformSet`] at
//! startup and never reaches the host environment any other way.

pub mod clipboard;
pub mod download;
pub mod headless;
pub mod image;
pub mod powerpack;
pub mod remote;
pub mod tab;

use std::sync::Arc;

pub use clipboard::ClipboardWriter;
pub use download::FileDownloader;
pub use image::ImageLoader;
pub use powerpack::PowerpackApi;
pub use remote::{RemoteConfig, RemoteConfigSource};
pub use tab::{TabBridge, TabCommand, TabSnapshot};

use crate::config::StoreConfig;

/// Errors returned by platform adapters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The adapter has no backing facility in this environment.
    #[error("{0} is not available")]
    Unavailable(&'static str),

    /// HTTP request failed or returned a non-success status.
    #[error("http: {0}")]
    Http(String),

    /// Local I/O failed (process spawn, file write).
    #[error("io: {0}")]
    Io(String),

    /// The remote side answered but the operation failed.
    #[error("{0}")]
    Failed(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        PlatformError::Http(e.to_string())
    }
}

impl From<std::io::Error> for PlatformError {
    fn from(e: std::io::Error) -> Self {
        PlatformError::Io(e.to_string())
    }
}

/// A composed set of platform adapters.
///
/// Only one adapter per concern is active at runtime. Cloning shares
/// the adapters.
#[derive(Clone)]
pub struct PlatformSet {
    pub tab: Arc<dyn TabBridge>,
    pub clipboard: Arc<dyn ClipboardWriter>,
    pub downloads: Arc<dyn FileDownloader>,
    pub images: Arc<dyn ImageLoader>,
    pub powerpack: Arc<dyn PowerpackApi>,
    pub remote_config: Arc<dyn RemoteConfigSource>,
}

impl PlatformSet {
    /// Adapters usable without a browser: HTTP for remote resources,
    /// xclip for the clipboard, a directory for downloads.
    pub fn headless(config: &StoreConfig, download_dir: impl Into<std::path::PathBuf>) -> Self {
        let client = reqwest::Client::new();
        Self {
            tab: Arc::new(headless::NoTab),
            clipboard: Arc::new(clipboard::XclipClipboard),
            downloads: Arc::new(download::DirectoryDownloader::new(download_dir)),
            images: Arc::new(image::HttpImageLoader::new(client.clone())),
            powerpack: Arc::new(headless::NoPowerpack),
            remote_config: Arc::new(remote::HttpConfigSource::new(
                client,
                config.resource_host.clone(),
            )),
        }
    }
}
