//! # Sync Module
//!
//! Durable, retrying background queue that pushes local library changes to
//! the server.
//!
//! ## Overview
//!
//! The UI layer records intents (upload a book, move it, update its progress,
//! add a bookmark) through the [`SyncScheduler`]. Each intent becomes a
//! [`Job`] that is persisted before it runs, so queued work survives restarts,
//! and is executed by a host-provided [`JobRunner`] when the network allows.
//!
//! ## Components
//!
//! - **Items** (`item`): Library snapshots and partial metadata updates
//! - **Job Model** (`job`): Typed payloads, identity keys, retry and network policies
//! - **Job Store** (`store`): Job persistence over the host key-value store
//! - **Queue Manager** (`queue`): Dispatch, retries with backoff, cancellation, rebuild
//! - **Completion Signal** (`completion`): Persisted "has queued jobs" flag
//! - **Event Bridge** (`events`): Lifecycle transitions published on the core event bus
//! - **Scheduler** (`scheduler`): Façade mapping intents to jobs

pub mod completion;
pub mod error;
pub mod events;
pub mod item;
pub mod job;
pub mod queue;
pub mod scheduler;
pub mod store;

pub use completion::{CompletionSignal, HAS_QUEUED_JOBS_KEY};
pub use error::{Result, SyncError};
pub use events::EventBusListener;
pub use item::{ItemType, MetadataUpdate, SyncableItem};
pub use job::{DeleteMode, Job, JobId, JobPayload, JobType, NetworkRequirement, RetryPolicy};
pub use queue::{
    JobListener, JobQueueManager, JobRunResult, JobRunner, QueueConfig, QueueStats,
    SubmitOutcome, TerminalOutcome,
};
pub use scheduler::{SchedulerSignal, SyncScheduler};
pub use store::{JobStore, JOB_KEY_PREFIX};
