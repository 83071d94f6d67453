//! # Job Queue Manager
//!
//! Owns the durable and in-memory queue of sync jobs and runs them.
//!
//! ## Overview
//!
//! The manager keeps one entry per identity key. Submissions are persisted to
//! the [`JobStore`] before they become eligible to run, and a job leaves the
//! store only when it terminates or is cancelled.
//!
//! A single dispatcher task picks eligible jobs in submission order and hands
//! them to workers, bounded by [`QueueConfig::max_concurrent_jobs`]. A job is
//! eligible when:
//!
//! - the queue is not suspended
//! - the latest [`NetworkInfo`] satisfies its [`NetworkRequirement`](crate::NetworkRequirement)
//! - its backoff deadline has passed
//! - no other job with the same identity key is still running
//!
//! Jobs that are not yet eligible never block later ones. Network-gated jobs
//! are re-examined when the host reports a connectivity change.
//!
//! ## Failure Handling
//!
//! A failed attempt increments `failed_attempts`. If the job's
//! [`RetryPolicy`](crate::RetryPolicy) allows another attempt, the updated job
//! is persisted and re-queued after a bounded exponential backoff. Otherwise
//! the job is dropped and listeners see [`TerminalOutcome::Failed`].
//!
//! ## Cancellation
//!
//! Pending jobs are removed immediately. In-flight jobs have their
//! [`CancellationToken`] triggered and are expected to stop on their own;
//! their result is discarded.

use crate::{Job, JobStore, Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{NetworkChangeStream, NetworkInfo, NetworkMonitor};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Applies a job's remote mutation
///
/// Implementations should watch `cancel` and return early once it fires.
/// Any error counts as a failed attempt.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: &Job, cancel: CancellationToken) -> Result<()>;
}

/// Observer of job lifecycle transitions
///
/// Callbacks run outside the queue lock, in the task that caused the
/// transition.
#[async_trait]
pub trait JobListener: Send + Sync {
    /// A job was accepted into the queue
    async fn on_scheduled(&self, _job: &Job) {}

    /// An attempt is about to start
    async fn on_before_run(&self, _job: &Job) {}

    /// An attempt finished
    async fn on_after_run(&self, _job: &Job, _result: &JobRunResult) {}

    /// The job left the queue after succeeding or exhausting its retries
    async fn on_terminated(&self, _job: &Job, _outcome: &TerminalOutcome) {}

    /// The job was cancelled before it could finish
    async fn on_cancelled(&self, _identity_key: &str) {}
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRunResult {
    Succeeded,
    Retrying { error: String, retry_in: Duration },
    Failed { error: String },
}

/// How a job left the queue, cancellation aside
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Succeeded,
    Failed { error: String },
}

/// What [`JobQueueManager::submit`] did with the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// No job held the identity key
    Scheduled,
    /// A job already held the key and the new one was discarded
    KeptExisting,
    /// The job holding the key was cancelled and replaced
    Replaced,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub max_concurrent: usize,
    pub suspended: bool,
}

// ============================================================================
// Configuration
// ============================================================================

/// Queue tunables
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Worker concurrency; 1 applies server mutations in submission order
    pub max_concurrent_jobs: usize,
    /// Delay before the first retry
    pub base_backoff: Duration,
    /// Upper bound for any retry delay
    pub max_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(5 * 60),
        }
    }
}

impl QueueConfig {
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_base_backoff(mut self, delay: Duration) -> Self {
        self.base_backoff = delay;
        self
    }

    pub fn with_max_backoff(mut self, delay: Duration) -> Self {
        self.max_backoff = delay;
        self
    }

    /// `min(base * 2^(failed_attempts - 1), max)`
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(31);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

// ============================================================================
// Queue State
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Accepted but `on_scheduled` has not returned yet
    Scheduling,
    Pending { not_before: Option<Instant> },
    Running,
}

struct Entry {
    job: Job,
    phase: Phase,
    cancel: CancellationToken,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<String, Entry>,
    /// Keys with a worker in flight, including superseded jobs still stopping
    running: HashSet<String>,
    next_seq: u64,
}

impl QueueState {
    fn insert(&mut self, job: Job, phase: Phase, cancel: CancellationToken) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            job.identity_key.clone(),
            Entry {
                job,
                phase,
                cancel,
                seq,
            },
        );
    }

    fn is_current(&self, job: &Job) -> bool {
        self.entries
            .get(&job.identity_key)
            .is_some_and(|entry| entry.job.id == job.id)
    }
}

/// Listener notifications collected under the lock and fired after it
enum Notice {
    AfterRun(Job, JobRunResult),
    Terminated(Job, JobRunResult, TerminalOutcome),
}

struct Inner {
    state: Mutex<QueueState>,
    suspended: AtomicBool,
    wake: Notify,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    network: watch::Sender<NetworkInfo>,
    listeners: RwLock<Vec<Arc<dyn JobListener>>>,
    runner: Arc<dyn JobRunner>,
    store: JobStore,
    monitor: Arc<dyn NetworkMonitor>,
    config: QueueConfig,
}

impl Inner {
    fn listeners(&self) -> Vec<Arc<dyn JobListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Start every eligible job and return the earliest backoff deadline still ahead
    async fn dispatch_ready(self: &Arc<Self>) -> Option<Instant> {
        if self.suspended.load(Ordering::SeqCst) || self.shutdown.is_cancelled() {
            return None;
        }

        let network = self.network.borrow().clone();
        let now = Instant::now();
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let mut candidates: Vec<(u64, String)> = state
            .entries
            .iter()
            .filter(|(key, entry)| {
                matches!(entry.phase, Phase::Pending { .. })
                    && !state.running.contains(*key)
                    && entry.job.network_requirement.is_satisfied_by(&network)
            })
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        candidates.sort_unstable();

        let mut next_deadline: Option<Instant> = None;
        for (_, key) in candidates {
            let Some(entry) = state.entries.get_mut(&key) else {
                continue;
            };
            if let Phase::Pending {
                not_before: Some(deadline),
            } = entry.phase
            {
                if deadline > now {
                    next_deadline = Some(next_deadline.map_or(deadline, |d| d.min(deadline)));
                    continue;
                }
            }

            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };

            entry.phase = Phase::Running;
            let job = entry.job.clone();
            let cancel = entry.cancel.clone();
            state.running.insert(key);

            debug!(job_key = %job.identity_key, attempt = job.attempt(), "Dispatching sync job");
            self.tracker
                .spawn(run_job(Arc::clone(self), job, cancel, permit));
        }

        next_deadline
    }

    /// Apply an attempt's result to the queue and the store
    async fn finish(&self, job: Job, result: Result<()>) {
        let key = job.identity_key.clone();
        let mut state = self.state.lock().await;
        state.running.remove(&key);

        if !state.is_current(&job) {
            debug!(job_key = %key, "Discarding result of cancelled or replaced sync job");
            return;
        }

        let notice = match result {
            Ok(()) => {
                if let Err(e) = self.store.remove(&key).await {
                    error!(job_key = %key, error = %e, "Failed to remove finished sync job from store");
                }
                state.entries.remove(&key);
                info!(job_key = %key, attempt = job.attempt(), "Sync job succeeded");
                Notice::Terminated(job, JobRunResult::Succeeded, TerminalOutcome::Succeeded)
            }
            Err(e) if self.shutdown.is_cancelled() => {
                debug!(job_key = %key, error = %e, "Sync job interrupted by shutdown");
                if let Some(entry) = state.entries.get_mut(&key) {
                    entry.phase = Phase::Pending { not_before: None };
                }
                return;
            }
            Err(e) => {
                let mut updated = job;
                let message = e.to_string();

                if updated.record_failure() {
                    let retry_in = self.config.backoff_delay(updated.failed_attempts);
                    if let Err(pe) = self.store.insert(&updated).await {
                        warn!(job_key = %key, error = %pe, "Failed to persist retry count");
                    }
                    if let Some(entry) = state.entries.get_mut(&key) {
                        entry.job = updated.clone();
                        entry.phase = Phase::Pending {
                            not_before: Some(Instant::now() + retry_in),
                        };
                    }
                    warn!(
                        job_key = %key,
                        failed_attempts = updated.failed_attempts,
                        retry_in_ms = retry_in.as_millis() as u64,
                        error = %message,
                        "Sync job failed, will retry"
                    );
                    Notice::AfterRun(
                        updated,
                        JobRunResult::Retrying {
                            error: message,
                            retry_in,
                        },
                    )
                } else {
                    if let Err(pe) = self.store.remove(&key).await {
                        error!(job_key = %key, error = %pe, "Failed to remove exhausted sync job from store");
                    }
                    state.entries.remove(&key);
                    error!(
                        job_key = %key,
                        failed_attempts = updated.failed_attempts,
                        error = %message,
                        "Sync job exhausted its retries"
                    );
                    Notice::Terminated(
                        updated,
                        JobRunResult::Failed {
                            error: message.clone(),
                        },
                        TerminalOutcome::Failed { error: message },
                    )
                }
            }
        };
        drop(state);

        let listeners = self.listeners();
        match notice {
            Notice::AfterRun(job, result) => {
                for listener in &listeners {
                    listener.on_after_run(&job, &result).await;
                }
            }
            Notice::Terminated(job, result, outcome) => {
                for listener in &listeners {
                    listener.on_after_run(&job, &result).await;
                }
                for listener in &listeners {
                    listener.on_terminated(&job, &outcome).await;
                }
            }
        }
    }
}

async fn run_job(
    inner: Arc<Inner>,
    job: Job,
    cancel: CancellationToken,
    permit: OwnedSemaphorePermit,
) {
    for listener in inner.listeners() {
        listener.on_before_run(&job).await;
    }

    let result = inner.runner.run(&job, cancel).await;
    inner.finish(job, result).await;

    drop(permit);
    inner.wake.notify_one();
}

async fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        let next_deadline = inner.dispatch_ready().await;
        let backoff_elapsed = async {
            match next_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = inner.wake.notified() => {}
            _ = backoff_elapsed => {}
        }
    }
    debug!("Sync dispatcher stopped");
}

async fn forward_network_changes(inner: Arc<Inner>, mut changes: Box<dyn NetworkChangeStream>) {
    loop {
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            next = changes.next() => match next {
                Some(info) => {
                    debug!(status = ?info.status, metered = info.is_metered, "Network changed");
                    inner.network.send_replace(info);
                    inner.wake.notify_one();
                }
                None => {
                    debug!("Network change stream closed");
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Manager Handle
// ============================================================================

/// Handle to a running job queue
///
/// Cloning is cheap; every clone drives the same queue. Call
/// [`shutdown`](Self::shutdown) to stop the background tasks.
#[derive(Clone)]
pub struct JobQueueManager {
    inner: Arc<Inner>,
}

impl JobQueueManager {
    /// Load persisted jobs and start dispatching
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub async fn start(
        store: JobStore,
        runner: Arc<dyn JobRunner>,
        monitor: Arc<dyn NetworkMonitor>,
        config: QueueConfig,
    ) -> Result<Self> {
        Self::launch(store, runner, monitor, config, Vec::new(), false).await
    }

    /// Like [`start`](Self::start), with listeners registered before any job runs
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub async fn start_with_listeners(
        store: JobStore,
        runner: Arc<dyn JobRunner>,
        monitor: Arc<dyn NetworkMonitor>,
        config: QueueConfig,
        listeners: Vec<Arc<dyn JobListener>>,
    ) -> Result<Self> {
        Self::launch(store, runner, monitor, config, listeners, false).await
    }

    #[instrument(skip(store, runner, monitor, config, listeners))]
    async fn launch(
        store: JobStore,
        runner: Arc<dyn JobRunner>,
        monitor: Arc<dyn NetworkMonitor>,
        config: QueueConfig,
        listeners: Vec<Arc<dyn JobListener>>,
        suspended: bool,
    ) -> Result<Self> {
        let jobs = store.load_all().await?;

        // Must subscribe before the first status read
        let changes = match monitor.subscribe_changes().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Network change notifications unavailable");
                None
            }
        };
        let initial_network = match monitor.get_network_info().await {
            Ok(info) => info,
            Err(e) => {
                warn!(error = %e, "Network status unavailable, assuming offline");
                NetworkInfo::disconnected()
            }
        };

        let config = QueueConfig {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            ..config
        };
        let shutdown = CancellationToken::new();

        let mut state = QueueState::default();
        let restored = jobs.len();
        for job in jobs {
            state.insert(job, Phase::Pending { not_before: None }, shutdown.child_token());
        }

        let (network, _) = watch::channel(initial_network);
        let inner = Arc::new(Inner {
            state: Mutex::new(state),
            suspended: AtomicBool::new(suspended),
            wake: Notify::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            tracker: TaskTracker::new(),
            shutdown,
            network,
            listeners: RwLock::new(listeners),
            runner,
            store,
            monitor,
            config,
        });

        if let Some(changes) = changes {
            inner
                .tracker
                .spawn(forward_network_changes(Arc::clone(&inner), changes));
        }
        inner.tracker.spawn(dispatch_loop(Arc::clone(&inner)));

        info!(
            restored,
            max_concurrent = inner.config.max_concurrent_jobs,
            "Sync queue started"
        );
        Ok(Self { inner })
    }

    pub fn add_listener(&self, listener: Arc<dyn JobListener>) {
        self.inner
            .listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn runner(&self) -> Arc<dyn JobRunner> {
        Arc::clone(&self.inner.runner)
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Enqueue a job, honouring its `override_existing` flag
    ///
    /// The job is persisted before it can run. `on_scheduled` fires only when
    /// the job was actually enqueued.
    ///
    /// # Errors
    ///
    /// - [`SyncError::QueueShutdown`] after [`shutdown`](Self::shutdown)
    /// - [`SyncError::Persistence`] if the store write fails; the queue is left unchanged
    #[instrument(skip(self, job), fields(job_key = %job.identity_key))]
    pub async fn submit(&self, job: Job) -> Result<SubmitOutcome> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::QueueShutdown);
        }

        let key = job.identity_key.clone();
        let outcome = {
            let mut state = self.inner.state.lock().await;

            let replacing = state.entries.contains_key(&key);
            if replacing && !job.override_existing {
                debug!("Keeping existing sync job");
                return Ok(SubmitOutcome::KeptExisting);
            }

            self.inner.store.insert(&job).await?;

            if let Some(previous) = state.entries.remove(&key) {
                previous.cancel.cancel();
                debug!(previous_id = %previous.job.id, "Replaced existing sync job");
            }
            state.insert(
                job.clone(),
                Phase::Scheduling,
                self.inner.shutdown.child_token(),
            );

            if replacing {
                SubmitOutcome::Replaced
            } else {
                SubmitOutcome::Scheduled
            }
        };

        for listener in self.inner.listeners() {
            listener.on_scheduled(&job).await;
        }

        {
            let mut state = self.inner.state.lock().await;
            if let Some(entry) = state.entries.get_mut(&key) {
                if entry.job.id == job.id && matches!(entry.phase, Phase::Scheduling) {
                    entry.phase = Phase::Pending { not_before: None };
                }
            }
        }
        self.inner.wake.notify_one();

        info!(job_type = %job.job_type(), ?outcome, "Sync job submitted");
        Ok(outcome)
    }

    /// Cancel the job holding `identity_key`, pending or in flight
    ///
    /// Returns `false` if no such job exists.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] if the store delete fails; the job is left queued
    #[instrument(skip(self))]
    pub async fn cancel(&self, identity_key: &str) -> Result<bool> {
        {
            let mut state = self.inner.state.lock().await;
            if !state.entries.contains_key(identity_key) {
                return Ok(false);
            }

            self.inner.store.remove(identity_key).await?;
            if let Some(entry) = state.entries.remove(identity_key) {
                entry.cancel.cancel();
            }
        }

        info!("Sync job cancelled");
        for listener in self.inner.listeners() {
            listener.on_cancelled(identity_key).await;
        }
        Ok(true)
    }

    /// Cancel every job and clear the store
    ///
    /// Returns the cancelled jobs in submission order. Jobs are removed from
    /// the store one at a time and leave memory only once their delete has
    /// succeeded, so a failure partway leaves queue and store in agreement.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Persistence`] on the first failed delete. Jobs
    /// removed before it stay cancelled and their listeners are notified.
    #[instrument(skip(self))]
    pub async fn cancel_all(&self) -> Result<Vec<Job>> {
        let (cancelled, failure) = {
            let mut state = self.inner.state.lock().await;
            let mut keys: Vec<(u64, String)> = state
                .entries
                .iter()
                .map(|(key, entry)| (entry.seq, key.clone()))
                .collect();
            keys.sort_unstable();

            let mut cancelled = Vec::with_capacity(keys.len());
            let mut failure = None;
            for (_, key) in keys {
                if let Err(e) = self.inner.store.remove(&key).await {
                    failure = Some(e);
                    break;
                }
                if let Some(entry) = state.entries.remove(&key) {
                    entry.cancel.cancel();
                    cancelled.push(entry.job);
                }
            }

            // Leftovers on disk with no live entry
            if failure.is_none() {
                if let Err(e) = self.inner.store.clear().await {
                    failure = Some(e);
                }
            }
            (cancelled, failure)
        };

        let listeners = self.inner.listeners();
        for job in &cancelled {
            for listener in &listeners {
                listener.on_cancelled(&job.identity_key).await;
            }
        }

        match failure {
            None => {
                info!(count = cancelled.len(), "All sync jobs cancelled");
                Ok(cancelled)
            }
            Some(e) => {
                let remaining = self.inner.state.lock().await.entries.len();
                warn!(
                    cancelled = cancelled.len(),
                    remaining,
                    error = %e,
                    "Cancelling sync jobs stopped at a store failure"
                );
                Err(e)
            }
        }
    }

    /// Snapshot of queued and running jobs in submission order
    pub async fn jobs(&self) -> Vec<Job> {
        let state = self.inner.state.lock().await;
        let mut entries: Vec<&Entry> = state.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.job.clone()).collect()
    }

    /// Stop starting new jobs; queued jobs stay persisted
    pub fn suspend(&self) {
        if !self.inner.suspended.swap(true, Ordering::SeqCst) {
            info!("Sync queue suspended");
        }
    }

    pub fn resume(&self) {
        if self.inner.suspended.swap(false, Ordering::SeqCst) {
            info!("Sync queue resumed");
        }
        self.inner.wake.notify_one();
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Stop dispatching, signal in-flight jobs to stop and wait for every task
    ///
    /// Interrupted jobs stay persisted and are picked up by the next manager.
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        info!("Sync queue shut down");
    }

    /// Shut this manager down and start a new one over the same store
    ///
    /// No job from this manager starts after the call returns. Listeners,
    /// configuration and the suspended state carry over.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read
    pub async fn rebuild(&self, runner: Arc<dyn JobRunner>) -> Result<JobQueueManager> {
        let suspended = self.is_suspended();
        self.shutdown().await;

        Self::launch(
            self.inner.store.clone(),
            runner,
            Arc::clone(&self.inner.monitor),
            self.inner.config.clone(),
            self.inner.listeners(),
            suspended,
        )
        .await
    }

    pub async fn contains(&self, identity_key: &str) -> bool {
        self.inner
            .state
            .lock()
            .await
            .entries
            .contains_key(identity_key)
    }

    /// Identity keys of queued and running jobs in submission order
    pub async fn pending_keys(&self) -> Vec<String> {
        let state = self.inner.state.lock().await;
        let mut keys: Vec<(u64, String)> = state
            .entries
            .iter()
            .map(|(key, entry)| (entry.seq, key.clone()))
            .collect();
        keys.sort_unstable();
        keys.into_iter().map(|(_, key)| key).collect()
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().await;
        let running = state
            .entries
            .values()
            .filter(|entry| matches!(entry.phase, Phase::Running))
            .count();

        QueueStats {
            pending: state.entries.len() - running,
            running,
            max_concurrent: self.inner.config.max_concurrent_jobs,
            suspended: self.is_suspended(),
        }
    }
}

impl std::fmt::Debug for JobQueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueueManager")
            .field("config", &self.inner.config)
            .field("suspended", &self.is_suspended())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeleteMode, JobPayload, NetworkRequirement, RetryPolicy};
    use bridge_desktop::{PushNetworkMonitor, SqliteKeyValueStore};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingRunner {
        runs: StdMutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl JobRunner for CountingRunner {
        async fn run(&self, job: &Job, _cancel: CancellationToken) -> Result<()> {
            self.runs.lock().unwrap().push(job.identity_key.clone());
            if self.fail {
                Err(SyncError::Remote("server unavailable".to_string()))
            } else {
                Ok(())
            }
        }
    }

    async fn store() -> JobStore {
        JobStore::new(Arc::new(SqliteKeyValueStore::in_memory().await.unwrap()))
    }

    fn delete_job(path: &str) -> Job {
        Job::new(JobPayload::delete(path, DeleteMode::Deep), 0)
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[test]
    fn test_backoff_is_bounded_exponential() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(8));
        assert_eq!(config.backoff_delay(20), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(300));

        let mut previous = Duration::ZERO;
        for attempt in 1..64 {
            let delay = config.backoff_delay(attempt);
            assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn test_concurrency_clamped_to_one() {
        let config = QueueConfig::default().with_max_concurrent_jobs(0);
        assert_eq!(config.max_concurrent_jobs, 1);
    }

    #[tokio::test]
    async fn test_submit_runs_and_removes_job() {
        let store = store().await;
        let runner = Arc::new(CountingRunner::default());
        let monitor = Arc::new(PushNetworkMonitor::new(NetworkInfo::wifi()));
        let queue = JobQueueManager::start(store.clone(), runner.clone(), monitor, QueueConfig::default())
            .await
            .unwrap();

        let outcome = queue.submit(delete_job("a.mp3")).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Scheduled);

        wait_until(|| runner.runs.lock().unwrap().len() == 1).await;
        for _ in 0..100 {
            if store.is_empty().await.unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.is_empty().await.unwrap());
        assert!(!queue.contains("delete/a.mp3").await);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_offline_jobs_stay_pending() {
        let store = store().await;
        let runner = Arc::new(CountingRunner::default());
        let monitor = Arc::new(PushNetworkMonitor::new(NetworkInfo::disconnected()));
        let queue = JobQueueManager::start(store.clone(), runner.clone(), monitor, QueueConfig::default())
            .await
            .unwrap();

        queue
            .submit(delete_job("a.mp3").with_network_requirement(NetworkRequirement::Cellular))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(runner.runs.lock().unwrap().is_empty());
        let stats = queue.stats().await;
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.running, 0);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_rejected() {
        let monitor = Arc::new(PushNetworkMonitor::new(NetworkInfo::wifi()));
        let queue = JobQueueManager::start(
            store().await,
            Arc::new(CountingRunner::default()),
            monitor,
            QueueConfig::default(),
        )
        .await
        .unwrap();

        queue.shutdown().await;
        assert!(queue.is_shut_down());
        assert!(matches!(
            queue.submit(delete_job("a.mp3")).await,
            Err(SyncError::QueueShutdown)
        ));
    }

    #[tokio::test]
    async fn test_failing_job_is_retried_in_place() {
        let store = store().await;
        let runner = Arc::new(CountingRunner {
            fail: true,
            ..Default::default()
        });
        let monitor = Arc::new(PushNetworkMonitor::new(NetworkInfo::wifi()));
        let config = QueueConfig::default().with_base_backoff(Duration::from_secs(60));
        let queue = JobQueueManager::start(store.clone(), runner.clone(), monitor, config)
            .await
            .unwrap();

        queue
            .submit(delete_job("a.mp3").with_retry_policy(RetryPolicy::Limited(3)))
            .await
            .unwrap();
        wait_until(|| runner.runs.lock().unwrap().len() == 1).await;

        let mut persisted = None;
        for _ in 0..100 {
            persisted = store.get("delete/a.mp3").await.unwrap();
            if persisted.as_ref().is_some_and(|job| job.failed_attempts == 1) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(persisted.unwrap().failed_attempts, 1);
        assert_eq!(queue.pending_keys().await, vec!["delete/a.mp3".to_string()]);
        queue.shutdown().await;
    }
}
