//! # Completion Signal
//!
//! Tracks whether any sync work is still queued and announces when the queue
//! drains.
//!
//! ## Overview
//!
//! The state lives in one persisted flag, [`HAS_QUEUED_JOBS_KEY`], in the
//! host [`SettingsStore`]. It starts out `false` on first launch and follows
//! two rules:
//!
//! - scheduling a job sets it to `true`
//! - after a job terminates or is cancelled, it is set to `false` if the job
//!   store is empty
//!
//! The drain transition emits [`SyncEvent::LibrarySynced`] once; further
//! terminal events on an already empty queue do not repeat it.
//!
//! UI code that starts before the scheduler can read the flag with
//! [`CompletionSignal::load_flag`].

use crate::queue::{JobListener, TerminalOutcome};
use crate::{Job, JobStore};
use async_trait::async_trait;
use bridge_traits::SettingsStore;
use core_runtime::{CoreEvent, EventBus, SyncEvent};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// Settings key of the persisted "has queued jobs" flag
pub const HAS_QUEUED_JOBS_KEY: &str = "sync.has_queued_jobs";

/// Owner of the "has queued jobs" flag
pub struct CompletionSignal {
    settings: Arc<dyn SettingsStore>,
    store: JobStore,
    event_bus: Option<EventBus>,
    state: Mutex<bool>,
    tx: watch::Sender<bool>,
}

impl CompletionSignal {
    /// Load the persisted flag and build the signal
    pub async fn new(
        settings: Arc<dyn SettingsStore>,
        store: JobStore,
        event_bus: Option<EventBus>,
    ) -> Self {
        let initial = Self::load_flag(settings.as_ref()).await;
        let (tx, _) = watch::channel(initial);

        Self {
            settings,
            store,
            event_bus,
            state: Mutex::new(initial),
            tx,
        }
    }

    /// Read the persisted flag; `false` when it was never written or cannot be read
    pub async fn load_flag(settings: &dyn SettingsStore) -> bool {
        match settings.get_bool(HAS_QUEUED_JOBS_KEY).await {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "Failed to read queued-jobs flag");
                false
            }
        }
    }

    /// Align the flag with the store contents without emitting events
    pub async fn reconcile(&self) {
        let has_jobs = match self.store.is_empty().await {
            Ok(empty) => !empty,
            Err(e) => {
                warn!(error = %e, "Failed to inspect job store");
                return;
            }
        };

        let mut state = self.state.lock().await;
        if *state != has_jobs {
            debug!(has_jobs, "Reconciled queued-jobs flag with job store");
            *state = has_jobs;
            self.publish(has_jobs).await;
        }
    }

    pub async fn has_queued_jobs(&self) -> bool {
        *self.state.lock().await
    }

    /// Observe flag changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Recheck the store after a terminal event and flip to `false` on drain
    pub async fn refresh(&self) {
        let mut state = self.state.lock().await;
        if !*state {
            return;
        }

        match self.store.is_empty().await {
            Ok(true) => {
                *state = false;
                self.publish(false).await;
                info!("Library finished syncing");
                if let Some(bus) = &self.event_bus {
                    let _ = bus.emit(CoreEvent::Sync(SyncEvent::LibrarySynced));
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Failed to inspect job store"),
        }
    }

    async fn publish(&self, value: bool) {
        if let Err(e) = self.settings.set_bool(HAS_QUEUED_JOBS_KEY, value).await {
            warn!(error = %e, "Failed to persist queued-jobs flag");
        }
        self.tx.send_replace(value);
    }
}

#[async_trait]
impl JobListener for CompletionSignal {
    async fn on_scheduled(&self, _job: &Job) {
        let mut state = self.state.lock().await;
        if !*state {
            *state = true;
            self.publish(true).await;
            debug!("Sync queue has pending work");
        }
    }

    async fn on_terminated(&self, _job: &Job, _outcome: &TerminalOutcome) {
        self.refresh().await;
    }

    async fn on_cancelled(&self, _identity_key: &str) {
        self.refresh().await;
    }
}

impl std::fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("has_queued_jobs", &*self.tx.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeleteMode, JobPayload};
    use bridge_desktop::{SqliteKeyValueStore, SqliteSettingsStore};

    async fn fixture() -> (CompletionSignal, JobStore, Arc<dyn SettingsStore>, EventBus) {
        let store = JobStore::new(Arc::new(SqliteKeyValueStore::in_memory().await.unwrap()));
        let settings: Arc<dyn SettingsStore> =
            Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        let bus = EventBus::new(16);
        let signal = CompletionSignal::new(settings.clone(), store.clone(), Some(bus.clone())).await;
        (signal, store, settings, bus)
    }

    fn job(path: &str) -> Job {
        Job::new(JobPayload::delete(path, DeleteMode::Deep), 0)
    }

    #[tokio::test]
    async fn test_flag_absent_on_first_launch() {
        let (signal, _, settings, _) = fixture().await;
        assert!(!signal.has_queued_jobs().await);
        assert!(!CompletionSignal::load_flag(settings.as_ref()).await);
    }

    #[tokio::test]
    async fn test_scheduling_persists_flag() {
        let (signal, store, settings, _) = fixture().await;
        let job = job("a.mp3");
        store.insert(&job).await.unwrap();

        signal.on_scheduled(&job).await;

        assert!(signal.has_queued_jobs().await);
        assert!(CompletionSignal::load_flag(settings.as_ref()).await);
        assert!(*signal.subscribe().borrow());
    }

    #[tokio::test]
    async fn test_drain_emits_library_synced_once() {
        let (signal, store, settings, bus) = fixture().await;
        let mut events = bus.subscribe();
        let first = job("a.mp3");
        let second = job("b.mp3");
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        signal.on_scheduled(&first).await;
        signal.on_scheduled(&second).await;

        store.remove(&first.identity_key).await.unwrap();
        signal.on_terminated(&first, &TerminalOutcome::Succeeded).await;
        assert!(signal.has_queued_jobs().await);

        store.remove(&second.identity_key).await.unwrap();
        signal.on_terminated(&second, &TerminalOutcome::Succeeded).await;
        signal.on_cancelled(&second.identity_key).await;

        assert!(!signal.has_queued_jobs().await);
        assert!(!CompletionSignal::load_flag(settings.as_ref()).await);
        assert_eq!(
            events.try_recv().unwrap(),
            CoreEvent::Sync(SyncEvent::LibrarySynced)
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reconcile_follows_store() {
        let (signal, store, settings, bus) = fixture().await;
        let mut events = bus.subscribe();
        store.insert(&job("a.mp3")).await.unwrap();

        signal.reconcile().await;
        assert!(signal.has_queued_jobs().await);

        store.clear().await.unwrap();
        signal.reconcile().await;
        assert!(!signal.has_queued_jobs().await);
        assert!(!CompletionSignal::load_flag(settings.as_ref()).await);
        assert!(events.try_recv().is_err());
    }
}
