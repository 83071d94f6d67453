//! Storage and File System Abstractions
//!
//! Provides platform-agnostic traits for file I/O, durable blob persistence
//! and key-value settings storage.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub size: u64,
    pub created_at: Option<i64>,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// Abstracts file I/O operations to support different platforms:
/// - Desktop: Direct filesystem access
/// - iOS/Android: Sandboxed app directories
///
/// The sync scheduler only needs enough of it to keep a stable copy of a
/// file that is being uploaded: hard links outside the library tree and
/// their removal once the upload finished.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn pin_file(fs: &dyn FileSystemAccess, src: &Path) -> Result<PathBuf> {
///     let data_dir = fs.get_data_directory().await?;
///     let target = data_dir.join("pinned").join(src.file_name().unwrap());
///     fs.hard_link(src, &target).await?;
///     Ok(target)
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Get the application's data directory
    ///
    /// This directory is suitable for persistent application data.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it if it doesn't exist
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Create a hard link at `link` pointing to the same data as `original`
    ///
    /// Fails with a not-found error when `original` does not exist. Parent
    /// directories of `link` must already exist.
    async fn hard_link(&self, original: &Path, link: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// Durable blob persistence trait
///
/// The restart-surviving store behind the sync job queue. Keys are opaque
/// strings chosen by the caller; values are serialized blobs.
///
/// - iOS: file-backed or `UserDefaults` suite
/// - Android: Room / SharedPreferences
/// - Desktop: SQLite table
///
/// Writes must be durable when the returned future resolves.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Insert or replace the blob stored under `key`
    async fn save(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Load every stored entry
    async fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>>;

    /// Load a single entry
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .load_all()
            .await?
            .into_iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v))
    }

    /// Number of entries whose key starts with `prefix`
    ///
    /// Stores with an index should override this; the default decodes nothing
    /// but still reads every entry.
    async fn count_prefix(&self, prefix: &str) -> Result<usize> {
        Ok(self
            .load_all()
            .await?
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .count())
    }

    /// Remove the entry stored under `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}

/// Key-value settings storage trait
///
/// Abstracts platform-specific preferences/settings storage:
/// - iOS: UserDefaults
/// - Android: SharedPreferences / DataStore
/// - Desktop: SQLite-backed key-value table
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_pending(store: &dyn SettingsStore) -> Result<()> {
///     store.set_bool("sync.has_queued_jobs", true).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Store a boolean value
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;

    /// Retrieve a boolean value
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;

    /// Store an integer value
    async fn set_i64(&self, key: &str, value: i64) -> Result<()>;

    /// Retrieve an integer value
    async fn get_i64(&self, key: &str) -> Result<Option<i64>>;

    /// Delete a setting
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a setting exists
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// List all setting keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Clear all settings
    async fn clear_all(&self) -> Result<()>;
}
