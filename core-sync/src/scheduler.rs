//! # Sync Scheduler
//!
//! High-level entry point the UI layer talks to.
//!
//! ## Overview
//!
//! Each `schedule_*` call turns a sync intent into a [`Job`] with the right
//! identity key and policies and submits it to the [`JobQueueManager`]:
//!
//! | Intent | Identity key | Retry | Network | Override |
//! |---|---|---|---|---|
//! | upload | `upload/{path}` | unlimited | wifi | no |
//! | update | `update/{path}` | limited(3) | cellular | yes |
//! | move | `move/{path}` | unlimited | cellular | no |
//! | delete | `delete/{path}` | limited(3) | cellular | no |
//! | shallow delete | `shallowDelete/{path}` | limited(3) | cellular | no |
//! | set bookmark | `setBookmark/{path}` | unlimited | cellular | no |
//! | delete bookmark | `deleteBookmark/{path}` | unlimited | cellular | no |
//!
//! Uploads read from a hard link under `uploads_dir` so that renaming or
//! moving the library file does not break an upload in flight. The link is
//! created once per queued upload and released once the transport reports
//! the upload complete.
//!
//! Every relative path must be made of plain name components; anything that
//! could resolve outside the library or uploads directory is rejected with
//! [`SyncError::InvalidPath`] before a job or a file is touched.
//!
//! ## Signals
//!
//! The transport and host can drive the scheduler through
//! [`SchedulerSignal`] values sent over an `mpsc` channel, see
//! [`SyncScheduler::listen`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_sync::{QueueConfig, SyncScheduler, SyncableItem};
//!
//! let scheduler = SyncScheduler::new(&config, runner, QueueConfig::default()).await?;
//! scheduler
//!     .schedule_upload(SyncableItem::book("Fiction/dune.m4b", "Dune"))
//!     .await?;
//! ```

use crate::completion::CompletionSignal;
use crate::events::EventBusListener;
use crate::item::{MetadataUpdate, SyncableItem};
use crate::job::{DeleteMode, Job, JobPayload, JobType, NetworkRequirement, RetryPolicy};
use crate::queue::{JobListener, JobQueueManager, JobRunner, QueueConfig, QueueStats, SubmitOutcome};
use crate::{JobStore, Result, SyncError};
use core_runtime::{checked_relative_path, CoreConfig, CoreEvent, QueueEvent};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Retry budget for updates and deletes
const LIMITED_RETRIES: u32 = 3;

/// Inbound notifications from the transport layer or the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerSignal {
    /// The remote side finished receiving the upload for this item
    UploadCompleted { relative_path: String },
    /// The queue must be reloaded from the store
    RebuildRequested,
}

/// Façade over the job queue, its store and the completion flag
pub struct SyncScheduler {
    config: CoreConfig,
    queue_config: QueueConfig,
    store: JobStore,
    completion: Arc<CompletionSignal>,
    queue: RwLock<JobQueueManager>,
    /// Serializes every change to the stable upload copies
    uploads: Mutex<()>,
}

impl SyncScheduler {
    /// Restore the persisted queue and start running it
    ///
    /// # Errors
    ///
    /// Returns an error if the job store cannot be read
    #[instrument(skip_all)]
    pub async fn new(
        config: &CoreConfig,
        runner: Arc<dyn JobRunner>,
        queue_config: QueueConfig,
    ) -> Result<Self> {
        let store = JobStore::new(Arc::clone(&config.key_value_store));

        let completion = Arc::new(
            CompletionSignal::new(
                Arc::clone(&config.settings_store),
                store.clone(),
                Some(config.event_bus.clone()),
            )
            .await,
        );
        completion.reconcile().await;

        let listeners: Vec<Arc<dyn JobListener>> = vec![
            completion.clone(),
            Arc::new(EventBusListener::new(config.event_bus.clone())),
        ];
        let queue = JobQueueManager::start_with_listeners(
            store.clone(),
            runner,
            Arc::clone(&config.network_monitor),
            queue_config.clone(),
            listeners,
        )
        .await?;

        info!(
            library_dir = %config.library_dir.display(),
            uploads_dir = %config.uploads_dir.display(),
            "Sync scheduler ready"
        );

        Ok(Self {
            config: config.clone(),
            queue_config,
            store,
            completion,
            queue: RwLock::new(queue),
            uploads: Mutex::new(()),
        })
    }

    fn now_millis(&self) -> i64 {
        self.config.clock.unix_timestamp_millis()
    }

    async fn submit(&self, job: Job) -> Result<SubmitOutcome> {
        self.queue.read().await.submit(job).await
    }

    // ------------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------------

    /// Upload a library item once Wi-Fi is available
    ///
    /// If an upload for the same item is already queued or running, it keeps
    /// its stable copy and the call returns [`SubmitOutcome::KeptExisting`]
    /// without touching the file system.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidPath`] if the item path could escape the library
    /// - [`SyncError::FileSystem`] if the source is missing or the stable copy
    ///   cannot be created; nothing is queued
    /// - [`SyncError::Persistence`] if the job cannot be stored
    #[instrument(skip(self, item), fields(relative_path = %item.relative_path))]
    pub async fn schedule_upload(&self, item: SyncableItem) -> Result<SubmitOutcome> {
        let source = self.config.library_path(&item.relative_path)?;
        let stable_copy = self.config.upload_copy_path(&item.relative_path)?;
        let key = JobType::Upload.identity_key(&item.relative_path);

        let _uploads = self.uploads.lock().await;
        let queue = self.queue.read().await;
        if queue.contains(&key).await {
            debug!("Upload already queued, keeping its stable copy");
            return Ok(SubmitOutcome::KeptExisting);
        }

        self.create_stable_copy(&source, &stable_copy).await?;

        let job = Job::new(
            JobPayload::Upload {
                item,
                stable_copy: stable_copy.clone(),
            },
            self.now_millis(),
        )
        .with_retry_policy(RetryPolicy::Unlimited)
        .with_network_requirement(NetworkRequirement::Wifi);

        match queue.submit(job).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.release_stable_copy(&stable_copy).await;
                Err(e)
            }
        }
    }

    /// Push metadata changes, replacing any queued update for the same item
    #[instrument(skip(self, changes))]
    pub async fn schedule_update(
        &self,
        relative_path: &str,
        changes: MetadataUpdate,
    ) -> Result<SubmitOutcome> {
        checked_relative_path(relative_path)?;
        let job = Job::new(
            JobPayload::Update {
                relative_path: relative_path.to_string(),
                changes,
            },
            self.now_millis(),
        )
        .with_retry_policy(RetryPolicy::Limited(LIMITED_RETRIES))
        .with_network_requirement(NetworkRequirement::Cellular)
        .with_override(true);

        self.submit(job).await
    }

    /// Move an item to `destination`; the origin is the item's current path
    #[instrument(skip(self))]
    pub async fn schedule_move(
        &self,
        relative_path: &str,
        destination: &str,
    ) -> Result<SubmitOutcome> {
        checked_relative_path(relative_path)?;
        let job = Job::new(
            JobPayload::Move {
                relative_path: relative_path.to_string(),
                origin: relative_path.to_string(),
                destination: destination.to_string(),
            },
            self.now_millis(),
        )
        .with_retry_policy(RetryPolicy::Unlimited)
        .with_network_requirement(NetworkRequirement::Cellular);

        self.submit(job).await
    }

    #[instrument(skip(self))]
    pub async fn schedule_delete(
        &self,
        relative_path: &str,
        mode: DeleteMode,
    ) -> Result<SubmitOutcome> {
        checked_relative_path(relative_path)?;
        let job = Job::new(JobPayload::delete(relative_path, mode), self.now_millis())
            .with_retry_policy(RetryPolicy::Limited(LIMITED_RETRIES))
            .with_network_requirement(NetworkRequirement::Cellular);

        self.submit(job).await
    }

    #[instrument(skip(self, note))]
    pub async fn schedule_set_bookmark(
        &self,
        relative_path: &str,
        time: f64,
        note: Option<String>,
    ) -> Result<SubmitOutcome> {
        checked_relative_path(relative_path)?;
        let job = Job::new(
            JobPayload::SetBookmark {
                relative_path: relative_path.to_string(),
                time,
                note,
            },
            self.now_millis(),
        )
        .with_retry_policy(RetryPolicy::Unlimited)
        .with_network_requirement(NetworkRequirement::Cellular);

        self.submit(job).await
    }

    #[instrument(skip(self))]
    pub async fn schedule_delete_bookmark(
        &self,
        relative_path: &str,
        time: f64,
    ) -> Result<SubmitOutcome> {
        checked_relative_path(relative_path)?;
        let job = Job::new(
            JobPayload::DeleteBookmark {
                relative_path: relative_path.to_string(),
                time,
            },
            self.now_millis(),
        )
        .with_retry_policy(RetryPolicy::Unlimited)
        .with_network_requirement(NetworkRequirement::Cellular);

        self.submit(job).await
    }

    // ------------------------------------------------------------------------
    // Reactive behaviour
    // ------------------------------------------------------------------------

    /// Drop the queued upload for `relative_path` and release its stable copy
    ///
    /// Other jobs for the same path are left alone. Returns whether an upload
    /// job was cancelled.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidPath`] if the path could escape the uploads directory
    /// - [`SyncError::Persistence`] if the job cannot be removed from the store
    #[instrument(skip(self))]
    pub async fn handle_upload_completed(&self, relative_path: &str) -> Result<bool> {
        let stable_copy = self.config.upload_copy_path(relative_path)?;
        let key = JobType::Upload.identity_key(relative_path);

        let _uploads = self.uploads.lock().await;
        let cancelled = self.queue.read().await.cancel(&key).await?;
        self.release_stable_copy(&stable_copy).await;
        Ok(cancelled)
    }

    /// Reload the queue from the store with the current runner
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub async fn rebuild_queue(&self) -> Result<()> {
        self.swap_queue(None).await
    }

    /// Reload the queue from the store with a different runner
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub async fn replace_runner(&self, runner: Arc<dyn JobRunner>) -> Result<()> {
        self.swap_queue(Some(runner)).await
    }

    #[instrument(skip_all)]
    async fn swap_queue(&self, runner: Option<Arc<dyn JobRunner>>) -> Result<()> {
        let mut queue = self.queue.write().await;
        let runner = runner.unwrap_or_else(|| queue.runner());

        let rebuilt = match queue.rebuild(runner).await {
            Ok(rebuilt) => rebuilt,
            Err(e) => {
                error!(error = %e, "Failed to rebuild sync queue");
                return Err(e);
            }
        };
        *queue = rebuilt;

        let pending = queue.stats().await.pending;
        info!(pending, "Sync queue rebuilt");
        let _ = self
            .config
            .event_bus
            .emit(CoreEvent::Queue(QueueEvent::Rebuilt { pending }));
        Ok(())
    }

    /// Act on one inbound signal
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation
    pub async fn handle_signal(&self, signal: SchedulerSignal) -> Result<()> {
        match signal {
            SchedulerSignal::UploadCompleted { relative_path } => {
                self.handle_upload_completed(&relative_path).await?;
            }
            SchedulerSignal::RebuildRequested => self.rebuild_queue().await?,
        }
        Ok(())
    }

    /// Consume signals until every sender is dropped
    pub fn listen(self: Arc<Self>, mut signals: mpsc::Receiver<SchedulerSignal>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                debug!(?signal, "Scheduler signal received");
                if let Err(e) = self.handle_signal(signal).await {
                    warn!(error = %e, "Failed to handle scheduler signal");
                }
            }
            debug!("Scheduler signal channel closed");
        })
    }

    // ------------------------------------------------------------------------
    // Queue control
    // ------------------------------------------------------------------------

    /// Cancel every queued job and clear the store
    ///
    /// Returns how many jobs were cancelled. Stable copies of cancelled
    /// uploads are released even when the store fails partway.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if a job cannot be removed from the
    /// store; jobs not yet removed stay queued
    #[instrument(skip(self))]
    pub async fn cancel_all_jobs(&self) -> Result<usize> {
        let _uploads = self.uploads.lock().await;
        let queue = self.queue.read().await;
        let before = queue.jobs().await;

        let result = queue.cancel_all().await;
        let cancelled = match &result {
            Ok(cancelled) => cancelled.clone(),
            Err(_) => {
                let mut gone = Vec::new();
                for job in before {
                    if !queue.contains(&job.identity_key).await {
                        gone.push(job);
                    }
                }
                gone
            }
        };

        for job in &cancelled {
            if let JobPayload::Upload { stable_copy, .. } = &job.payload {
                self.release_stable_copy(stable_copy).await;
            }
        }
        self.completion.refresh().await;
        result.map(|cancelled| cancelled.len())
    }

    pub async fn suspend(&self) {
        self.queue.read().await.suspend();
        let _ = self
            .config
            .event_bus
            .emit(CoreEvent::Queue(QueueEvent::Suspended));
    }

    pub async fn resume(&self) {
        self.queue.read().await.resume();
        let _ = self
            .config
            .event_bus
            .emit(CoreEvent::Queue(QueueEvent::Resumed));
    }

    pub async fn is_suspended(&self) -> bool {
        self.queue.read().await.is_suspended()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.read().await.stats().await
    }

    pub async fn pending_keys(&self) -> Vec<String> {
        self.queue.read().await.pending_keys().await
    }

    /// Current value of the persisted "has queued jobs" flag
    pub async fn has_queued_jobs(&self) -> bool {
        self.completion.has_queued_jobs().await
    }

    /// Observe the "has queued jobs" flag
    pub fn subscribe_sync_state(&self) -> watch::Receiver<bool> {
        self.completion.subscribe()
    }

    /// Register a listener; it survives queue rebuilds
    pub async fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.queue.read().await.add_listener(listener);
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    pub fn queue_config(&self) -> &QueueConfig {
        &self.queue_config
    }

    /// Stop the queue; persisted jobs resume on the next start
    pub async fn shutdown(&self) {
        self.queue.read().await.shutdown().await;
    }

    // ------------------------------------------------------------------------
    // Stable upload copies
    // ------------------------------------------------------------------------

    async fn create_stable_copy(&self, source: &Path, link: &Path) -> Result<()> {
        let fs = &self.config.file_system;

        let source_exists = fs
            .exists(source)
            .await
            .map_err(|e| file_system_error(source, e))?;
        if !source_exists {
            return Err(SyncError::FileSystem {
                path: source.display().to_string(),
                message: "source file does not exist".to_string(),
            });
        }

        if let Some(parent) = link.parent() {
            fs.create_dir_all(parent)
                .await
                .map_err(|e| file_system_error(parent, e))?;
        }

        match fs.delete_file(link).await {
            Ok(()) => debug!(path = %link.display(), "Replaced stale upload copy"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(file_system_error(link, e)),
        }

        fs.hard_link(source, link)
            .await
            .map_err(|e| file_system_error(link, e))?;
        debug!(source = %source.display(), link = %link.display(), "Created stable upload copy");
        Ok(())
    }

    async fn release_stable_copy(&self, link: &Path) {
        match self.config.file_system.delete_file(link).await {
            Ok(()) => debug!(path = %link.display(), "Released stable upload copy"),
            Err(e) if e.is_not_found() => {
                debug!(path = %link.display(), "Stable upload copy already gone");
            }
            Err(e) => {
                warn!(path = %link.display(), error = %e, "Failed to release stable upload copy");
            }
        }
    }
}

impl std::fmt::Debug for SyncScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncScheduler")
            .field("library_dir", &self.config.library_dir)
            .field("uploads_dir", &self.config.uploads_dir)
            .field("queue_config", &self.queue_config)
            .finish()
    }
}

fn file_system_error(path: &Path, err: bridge_traits::BridgeError) -> SyncError {
    SyncError::FileSystem {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
