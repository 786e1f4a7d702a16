//! FileDownloader trait - "save as" for script-generated files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::PlatformError;

#[async_trait]
pub trait FileDownloader: Send + Sync {
    /// Offer `content` to the user as a file named `file_name`.
    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), PlatformError>;
}

/// Writes downloads into a fixed directory.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target path for `file_name`. Only the final path component is
    /// kept so a script cannot write outside the directory.
    fn target(&self, file_name: &str) -> Result<PathBuf, PlatformError> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| PlatformError::Failed(format!("invalid file name: {file_name:?}")))?;
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl FileDownloader for DirectoryDownloader {
    async fn download(&self, file_name: &str, content: &[u8]) -> Result<(), PlatformError> {
        let path = self.target(file_name)?;
        tokio::fs::write(&path, content).await?;
        tracing::debug!(path = %path.display(), bytes = content.len(), "download written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_into_directory() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectoryDownloader::new(dir.path());
        downloader.download("notes.md", b"# hi").await.unwrap();
        let written = tokio::fs::read(dir.path().join("notes.md")).await.unwrap();
        assert_eq!(written, b"# hi");
    }

    #[tokio::test]
    async fn strips_directory_components() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectoryDownloader::new(dir.path());
        downloader.download("../../escape.txt", b"x").await.unwrap();
        assert!(dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn bad_directory_is_io_error() {
        let downloader = DirectoryDownloader::new("/nonexistent/dir");
        let err = downloader.download("a.txt", b"data").await.unwrap_err();
        assert!(matches!(err, PlatformError::Io(_)));
    }

    #[tokio::test]
    async fn empty_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = DirectoryDownloader::new(dir.path());
        assert!(downloader.download("..", b"x").await.is_err());
    }
}
