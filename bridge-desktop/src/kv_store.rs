//! Durable key-value storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::KeyValueStore,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::PathBuf;
use tracing::debug;

use crate::db;

/// SQLite-backed blob store
///
/// Backs the sync job queue on desktop. Every write is committed before the
/// call returns, so queued jobs survive a crash or restart.
pub struct SqliteKeyValueStore {
    pool: SqlitePool,
}

impl SqliteKeyValueStore {
    /// Create a new store with the given database path
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        let pool = db::connect_file(&db_path).await?;
        let store = Self { pool };
        store.initialize().await?;

        debug!(path = ?db_path, "Initialized key-value store");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        let pool = db::connect_memory().await?;
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Build a store on an existing pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn save(&self, key: &str, value: &[u8]) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(db::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to save entry: {}", e)))?;

        debug!(key = key, size = value.len(), "Saved entry");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<(String, Vec<u8>)>> {
        let rows = sqlx::query("SELECT key, value FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to load entries: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.get::<String, _>(0), row.get::<Vec<u8>, _>(1)))
            .collect())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to load entry: {}", e)))?;

        Ok(row.map(|row| row.get::<Vec<u8>, _>(0)))
    }

    async fn count_prefix(&self, prefix: &str) -> Result<usize> {
        // substr avoids LIKE, where '_' in a prefix would act as a wildcard
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM kv_store WHERE substr(key, 1, length(?1)) = ?1",
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to count entries: {}", e)))?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to remove entry: {}", e)))?;

        debug!(key = key, "Removed entry");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to clear store: {}", e)))?;

        debug!("Cleared key-value store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.save("jobs/a", b"first").await.unwrap();
        store.save("jobs/b", b"second").await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0], ("jobs/a".to_string(), b"first".to_vec()));
        assert_eq!(store.load("jobs/b").await.unwrap(), Some(b"second".to_vec()));
    }

    #[tokio::test]
    async fn test_save_replaces_existing_value() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.save("jobs/a", b"old").await.unwrap();
        store.save("jobs/a", b"new").await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all, vec![("jobs/a".to_string(), b"new".to_vec())]);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.save("a", b"1").await.unwrap();
        store.save("b", b"2").await.unwrap();

        store.remove("a").await.unwrap();
        // Missing keys are not an error
        store.remove("a").await.unwrap();
        assert_eq!(store.load("a").await.unwrap(), None);

        store.clear().await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_prefix_treats_underscore_literally() {
        let store = SqliteKeyValueStore::in_memory().await.unwrap();

        store.save("sync_jobs/a", b"1").await.unwrap();
        store.save("sync_jobs/b", b"2").await.unwrap();
        store.save("syncXjobs/c", b"3").await.unwrap();
        store.save("settings", b"4").await.unwrap();

        assert_eq!(store.count_prefix("sync_jobs/").await.unwrap(), 2);
        assert_eq!(store.count_prefix("missing/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue").join("jobs.db");

        {
            let store = SqliteKeyValueStore::new(path.clone()).await.unwrap();
            store.save("upload/book.mp3", b"payload").await.unwrap();
        }

        let reopened = SqliteKeyValueStore::new(path).await.unwrap();
        assert_eq!(
            reopened.load("upload/book.mp3").await.unwrap(),
            Some(b"payload".to_vec())
        );
    }
}
