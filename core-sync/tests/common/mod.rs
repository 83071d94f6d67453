//! Shared fixtures for the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::{PushNetworkMonitor, SqliteKeyValueStore, SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{KeyValueStore, NetworkInfo, SettingsStore};
use core_runtime::{CoreConfig, CoreEvent, EventBus};
use core_sync::{
    Job, JobListener, JobRunResult, JobRunner, JobStore, QueueConfig, SyncError, SyncScheduler,
    TerminalOutcome,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Runner
// ============================================================================

/// Runner that records every attempt
#[derive(Default)]
pub struct RecordingRunner {
    runs: Mutex<Vec<Job>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    hold: AtomicBool,
    cancelled: Mutex<Vec<String>>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every attempt fails
    pub fn always_failing() -> Arc<Self> {
        let runner = Self::default();
        runner.fail_all.store(true, Ordering::SeqCst);
        Arc::new(runner)
    }

    /// Every attempt waits for its cancellation token
    pub fn holding() -> Arc<Self> {
        let runner = Self::default();
        runner.hold.store(true, Ordering::SeqCst);
        Arc::new(runner)
    }

    pub fn fail_key(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    /// Identity keys in the order they were run
    pub fn runs(&self) -> Vec<String> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.identity_key.clone())
            .collect()
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.runs.lock().unwrap().clone()
    }

    pub fn run_count(&self, key: &str) -> usize {
        self.runs().iter().filter(|k| k.as_str() == key).count()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobRunner for RecordingRunner {
    async fn run(&self, job: &Job, cancel: CancellationToken) -> core_sync::Result<()> {
        self.runs.lock().unwrap().push(job.clone());

        if self.hold.load(Ordering::SeqCst) {
            cancel.cancelled().await;
            self.cancelled.lock().unwrap().push(job.identity_key.clone());
            return Err(SyncError::Remote("cancelled".to_string()));
        }

        let fails = self.fail_all.load(Ordering::SeqCst)
            || self.failing.lock().unwrap().contains(&job.identity_key);
        if fails {
            Err(SyncError::Remote("503 Service Unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Scheduled(String),
    BeforeRun(String, u32),
    AfterRun(String, JobRunResult),
    Terminated(String, TerminalOutcome),
    Cancelled(String),
}

#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn terminated(&self) -> Vec<(String, TerminalOutcome)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::Terminated(key, outcome) => Some((key, outcome)),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl JobListener for RecordingListener {
    async fn on_scheduled(&self, job: &Job) {
        self.push(Recorded::Scheduled(job.identity_key.clone()));
    }

    async fn on_before_run(&self, job: &Job) {
        self.push(Recorded::BeforeRun(job.identity_key.clone(), job.attempt()));
    }

    async fn on_after_run(&self, job: &Job, result: &JobRunResult) {
        self.push(Recorded::AfterRun(job.identity_key.clone(), result.clone()));
    }

    async fn on_terminated(&self, job: &Job, outcome: &TerminalOutcome) {
        self.push(Recorded::Terminated(job.identity_key.clone(), outcome.clone()));
    }

    async fn on_cancelled(&self, identity_key: &str) {
        self.push(Recorded::Cancelled(identity_key.to_string()));
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Settings store that records every boolean write
pub struct CountingSettings {
    inner: SqliteSettingsStore,
    bool_writes: Mutex<Vec<(String, bool)>>,
}

impl CountingSettings {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteSettingsStore::in_memory().await.unwrap(),
            bool_writes: Mutex::new(Vec::new()),
        })
    }

    pub fn bool_writes(&self, key: &str) -> Vec<bool> {
        self.bool_writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, value)| *value)
            .collect()
    }
}

#[async_trait]
impl SettingsStore for CountingSettings {
    async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()> {
        self.inner.set_string(key, value).await
    }

    async fn get_string(&self, key: &str) -> BridgeResult<Option<String>> {
        self.inner.get_string(key).await
    }

    async fn set_bool(&self, key: &str, value: bool) -> BridgeResult<()> {
        self.bool_writes
            .lock()
            .unwrap()
            .push((key.to_string(), value));
        self.inner.set_bool(key, value).await
    }

    async fn get_bool(&self, key: &str) -> BridgeResult<Option<bool>> {
        self.inner.get_bool(key).await
    }

    async fn set_i64(&self, key: &str, value: i64) -> BridgeResult<()> {
        self.inner.set_i64(key, value).await
    }

    async fn get_i64(&self, key: &str) -> BridgeResult<Option<i64>> {
        self.inner.get_i64(key).await
    }

    async fn delete(&self, key: &str) -> BridgeResult<()> {
        self.inner.delete(key).await
    }

    async fn has_key(&self, key: &str) -> BridgeResult<bool> {
        self.inner.has_key(key).await
    }

    async fn list_keys(&self) -> BridgeResult<Vec<String>> {
        self.inner.list_keys().await
    }

    async fn clear_all(&self) -> BridgeResult<()> {
        self.inner.clear_all().await
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Library and uploads directories plus in-memory stores
pub struct Harness {
    pub config: CoreConfig,
    pub network: PushNetworkMonitor,
    pub kv: Arc<dyn KeyValueStore>,
    pub settings: Arc<CountingSettings>,
    pub bus: EventBus,
    _root: TempDir,
}

impl Harness {
    pub async fn new(network: NetworkInfo) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::in_memory().await.unwrap());
        Self::with_store(network, kv).await
    }

    /// Harness over an existing job store, as after a process restart
    pub async fn with_store(network: NetworkInfo, kv: Arc<dyn KeyValueStore>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let library_dir = root.path().join("library");
        let uploads_dir = root.path().join("uploads");
        std::fs::create_dir_all(&library_dir).unwrap();

        let network = PushNetworkMonitor::new(network);
        let settings = CountingSettings::new().await;
        let bus = EventBus::new(256);

        let config = CoreConfig::builder()
            .library_dir(library_dir.clone())
            .uploads_dir(uploads_dir)
            .key_value_store(kv.clone())
            .settings_store(settings.clone())
            .file_system(Arc::new(TokioFileSystem::with_data_directory(
                root.path().to_path_buf(),
            )))
            .network_monitor(Arc::new(network.clone()))
            .event_bus(bus.clone())
            .build()
            .unwrap();

        Self {
            config,
            network,
            kv,
            settings,
            bus,
            _root: root,
        }
    }

    pub async fn scheduler(&self, runner: Arc<dyn JobRunner>) -> SyncScheduler {
        SyncScheduler::new(&self.config, runner, fast_queue())
            .await
            .unwrap()
    }

    pub async fn scheduler_with(
        &self,
        runner: Arc<dyn JobRunner>,
        queue_config: QueueConfig,
    ) -> SyncScheduler {
        SyncScheduler::new(&self.config, runner, queue_config)
            .await
            .unwrap()
    }

    pub fn job_store(&self) -> JobStore {
        JobStore::new(self.kv.clone())
    }

    /// Create a library file and return its absolute path
    pub fn write_library_file(&self, relative_path: &str) -> PathBuf {
        let path = self.config.library_path(relative_path).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"ID3 audio bytes").unwrap();
        path
    }

    pub fn upload_copy(&self, relative_path: &str) -> PathBuf {
        self.config.upload_copy_path(relative_path).unwrap()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.bus.subscribe()
    }
}

/// Short backoff so retry tests finish quickly
pub fn fast_queue() -> QueueConfig {
    QueueConfig::default()
        .with_base_backoff(Duration::from_millis(5))
        .with_max_backoff(Duration::from_millis(20))
}

// ============================================================================
// Waiting
// ============================================================================

const POLL: Duration = Duration::from_millis(10);
const ATTEMPTS: usize = 500;

/// Poll a synchronous condition for up to five seconds
pub async fn wait_for<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..ATTEMPTS {
        if check() {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("timed out waiting for {what}");
}

pub async fn wait_for_store_len(store: &JobStore, expected: usize) {
    for _ in 0..ATTEMPTS {
        if store.len().await.unwrap() == expected {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!(
        "job store holds {} jobs, expected {expected}",
        store.len().await.unwrap()
    );
}

pub async fn wait_for_sync_state(scheduler: &SyncScheduler, expected: bool) {
    for _ in 0..ATTEMPTS {
        if scheduler.has_queued_jobs().await == expected {
            return;
        }
        tokio::time::sleep(POLL).await;
    }
    panic!("sync state never became {expected}");
}

/// Drain every event currently buffered on the receiver
pub fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Give the dispatcher time to start anything it is going to start
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
