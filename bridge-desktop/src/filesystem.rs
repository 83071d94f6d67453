//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Tokio-based file system implementation
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a new file system accessor rooted at the platform data directory
    pub fn new() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join("audiobook-core");

        Self { data_dir }
    }

    /// Create a new file system accessor with a custom data directory
    pub fn with_data_directory(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn map_io_error(path: &Path, e: std::io::Error) -> BridgeError {
        if e.kind() == std::io::ErrorKind::NotFound {
            BridgeError::NotFound(path.display().to_string())
        } else {
            BridgeError::Io(e)
        }
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_secs(time: std::io::Result<std::time::SystemTime>) -> Option<i64> {
    time.ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.data_dir).await.unwrap_or(false) {
            fs::create_dir_all(&self.data_dir)
                .await
                .map_err(|e| Self::map_io_error(&self.data_dir, e))?;
            debug!(path = ?self.data_dir, "Created data directory");
        }
        Ok(self.data_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(BridgeError::Io)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        Ok(FileMetadata {
            size: metadata.len(),
            created_at: unix_secs(metadata.created()),
            modified_at: unix_secs(metadata.modified()),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn hard_link(&self, original: &Path, link: &Path) -> Result<()> {
        if !fs::try_exists(original).await.map_err(BridgeError::Io)? {
            return Err(BridgeError::NotFound(original.display().to_string()));
        }

        fs::hard_link(original, link)
            .await
            .map_err(|e| Self::map_io_error(link, e))?;
        debug!(original = ?original, link = ?link, "Created hard link");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path)
            .await
            .map_err(|e| Self::map_io_error(path, e))?;

        while let Some(entry) = read_dir.next_entry().await.map_err(BridgeError::Io)? {
            entries.push(entry.path());
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_custom_data_directory_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        let fs = TokioFileSystem::with_data_directory(data.clone());

        assert_eq!(fs.get_data_directory().await.unwrap(), data);
        assert!(fs.exists(&data).await.unwrap());
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());
        let test_file = dir.path().join("nested").join("test-file.txt");

        let data = Bytes::from("Hello, World!");
        fs.write_file(&test_file, data.clone()).await.unwrap();

        assert_eq!(fs.read_file(&test_file).await.unwrap(), data);
        assert_eq!(fs.metadata(&test_file).await.unwrap().size, 13);

        fs.delete_file(&test_file).await.unwrap();
        assert!(!fs.exists(&test_file).await.unwrap());
    }

    #[tokio::test]
    async fn test_hard_link_survives_original_rename() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());
        let original = dir.path().join("library").join("book.mp3");
        let link = dir.path().join("uploads").join("book.mp3");

        fs.write_file(&original, Bytes::from("audio")).await.unwrap();
        fs.create_dir_all(link.parent().unwrap()).await.unwrap();
        fs.hard_link(&original, &link).await.unwrap();

        tokio::fs::rename(&original, dir.path().join("library").join("moved.mp3"))
            .await
            .unwrap();

        assert_eq!(fs.read_file(&link).await.unwrap(), Bytes::from("audio"));
    }

    #[tokio::test]
    async fn test_hard_link_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());

        let err = fs
            .hard_link(&dir.path().join("missing.mp3"), &dir.path().join("link.mp3"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = TokioFileSystem::with_data_directory(dir.path().to_path_buf());

        let err = fs.delete_file(&dir.path().join("gone")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
