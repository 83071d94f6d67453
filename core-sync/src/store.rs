//! # Durable Job Store
//!
//! Persists queued jobs so they survive process restarts.
//!
//! ## Overview
//!
//! Each job is stored as one JSON blob in the host's
//! [`KeyValueStore`](bridge_traits::KeyValueStore) under
//! `sync_jobs/<identity key>`. Writing a job with a key that already exists
//! replaces it, which keeps the one-job-per-identity-key rule true on disk.
//!
//! On load, jobs come back ordered by `created_at` so the queue resumes in
//! submission order. Blobs that no longer decode are logged and removed
//! rather than blocking the rest of the queue.

use crate::{Job, Result, SyncError};
use bridge_traits::{BridgeError, KeyValueStore};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Key prefix shared by every persisted job blob
pub const JOB_KEY_PREFIX: &str = "sync_jobs/";

/// Job persistence over a host key-value store
#[derive(Clone)]
pub struct JobStore {
    kv: Arc<dyn KeyValueStore>,
}

impl JobStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn storage_key(identity_key: &str) -> String {
        format!("{JOB_KEY_PREFIX}{identity_key}")
    }

    /// Insert or replace the job stored under its identity key
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the write fails
    #[instrument(skip(self, job), fields(job_key = %job.identity_key))]
    pub async fn insert(&self, job: &Job) -> Result<()> {
        let blob = serde_json::to_vec(job)?;
        self.kv
            .save(&Self::storage_key(&job.identity_key), &blob)
            .await
            .map_err(persistence)?;
        debug!(failed_attempts = job.failed_attempts, "Persisted sync job");
        Ok(())
    }

    /// Every persisted job in submission order
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the store cannot be read
    pub async fn load_all(&self) -> Result<Vec<Job>> {
        let entries = self.kv.load_all().await.map_err(persistence)?;
        let mut jobs = Vec::with_capacity(entries.len());

        for (key, blob) in entries {
            if !key.starts_with(JOB_KEY_PREFIX) {
                continue;
            }
            match serde_json::from_slice::<Job>(&blob) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    warn!(key = %key, error = %e, "Dropping undecodable sync job");
                    if let Err(e) = self.kv.remove(&key).await {
                        warn!(key = %key, error = %e, "Failed to remove undecodable sync job");
                    }
                }
            }
        }

        jobs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.as_str().cmp(&b.id.as_str()))
        });
        Ok(jobs)
    }

    /// Job stored under `identity_key`, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the blob does not decode
    pub async fn get(&self, identity_key: &str) -> Result<Option<Job>> {
        let blob = self
            .kv
            .load(&Self::storage_key(identity_key))
            .await
            .map_err(persistence)?;
        blob.map(|b| serde_json::from_slice(&b).map_err(SyncError::from))
            .transpose()
    }

    /// Remove the job stored under `identity_key`; missing keys are not an error
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the delete fails
    pub async fn remove(&self, identity_key: &str) -> Result<()> {
        match self.kv.remove(&Self::storage_key(identity_key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(persistence(e)),
        }
    }

    /// Remove every persisted job and return how many were removed
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] on the first failed delete
    pub async fn clear(&self) -> Result<usize> {
        let keys: Vec<String> = self
            .kv
            .load_all()
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(JOB_KEY_PREFIX))
            .collect();

        for key in &keys {
            self.kv.remove(key).await.map_err(persistence)?;
        }
        Ok(keys.len())
    }

    /// Number of persisted jobs, counted without decoding them
    pub async fn len(&self) -> Result<usize> {
        self.kv
            .count_prefix(JOB_KEY_PREFIX)
            .await
            .map_err(persistence)
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("prefix", &JOB_KEY_PREFIX)
            .finish()
    }
}

fn persistence(err: BridgeError) -> SyncError {
    SyncError::Persistence(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeleteMode, JobPayload};
    use async_trait::async_trait;
    use bridge_desktop::SqliteKeyValueStore;
    use bridge_traits::error::Result as BridgeResult;
    use mockall::mock;

    mock! {
        Kv {}

        #[async_trait]
        impl KeyValueStore for Kv {
            async fn save(&self, key: &str, value: &[u8]) -> BridgeResult<()>;
            async fn load_all(&self) -> BridgeResult<Vec<(String, Vec<u8>)>>;
            async fn count_prefix(&self, prefix: &str) -> BridgeResult<usize>;
            async fn remove(&self, key: &str) -> BridgeResult<()>;
            async fn clear(&self) -> BridgeResult<()>;
        }
    }

    async fn store() -> (JobStore, Arc<dyn KeyValueStore>) {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
        (JobStore::new(kv.clone()), kv)
    }

    fn delete_job(path: &str, created_at: i64) -> Job {
        Job::new(JobPayload::delete(path, DeleteMode::Deep), created_at)
    }

    #[tokio::test]
    async fn test_insert_replaces_same_identity_key() {
        let (store, _) = store().await;
        let first = delete_job("a.mp3", 1);
        let second = delete_job("a.mp3", 2);

        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();

        assert_eq!(store.len().await.unwrap(), 1);
        let loaded = store.get("delete/a.mp3").await.unwrap().unwrap();
        assert_eq!(loaded.id, second.id);
    }

    #[tokio::test]
    async fn test_load_all_orders_by_creation() {
        let (store, _) = store().await;
        store.insert(&delete_job("c.mp3", 30)).await.unwrap();
        store.insert(&delete_job("a.mp3", 10)).await.unwrap();
        store.insert(&delete_job("b.mp3", 20)).await.unwrap();

        let paths: Vec<String> = store
            .load_all()
            .await
            .unwrap()
            .iter()
            .map(|job| job.relative_path().to_string())
            .collect();
        assert_eq!(paths, vec!["a.mp3", "b.mp3", "c.mp3"]);
    }

    #[tokio::test]
    async fn test_load_all_drops_corrupt_blobs() {
        let (store, kv) = store().await;
        store.insert(&delete_job("a.mp3", 1)).await.unwrap();
        kv.save("sync_jobs/delete/broken.mp3", b"{not json")
            .await
            .unwrap();
        kv.save("unrelated", b"keep me").await.unwrap();

        let jobs = store.load_all().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(kv.load("sync_jobs/delete/broken.mp3").await.unwrap().is_none());
        assert!(kv.load("unrelated").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (store, kv) = store().await;
        store.insert(&delete_job("a.mp3", 1)).await.unwrap();
        store.insert(&delete_job("b.mp3", 2)).await.unwrap();
        kv.save("unrelated", b"1").await.unwrap();

        store.remove("delete/a.mp3").await.unwrap();
        store.remove("delete/missing.mp3").await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.is_empty().await.unwrap());
        assert!(kv.load("unrelated").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_len_counts_keys_without_reading_blobs() {
        let mut kv = MockKv::new();
        kv.expect_load_all().never();
        kv.expect_count_prefix()
            .withf(|prefix: &str| prefix == JOB_KEY_PREFIX)
            .returning(|_| Ok(2));
        let store = JobStore::new(Arc::new(kv));

        assert_eq!(store.len().await.unwrap(), 2);
        assert!(!store.is_empty().await.unwrap());
    }
}
