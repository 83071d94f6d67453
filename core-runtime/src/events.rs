//! # Event Bus System
//!
//! Provides an event-driven architecture for the audiobook sync core using
//! `tokio::sync::broadcast`. Hosts subscribe to learn about job lifecycle
//! changes and about the library finishing its sync.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for sync jobs and queue control
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    emit     ┌───────────┐
//! │ Job listener ├────────────>│           │    subscribe    ┌────────────┐
//! └──────────────┘             │ EventBus  ├────────────────>│ UI / host  │
//! ┌──────────────┐    emit     │ (broadcast│                 └────────────┘
//! │ Scheduler    ├────────────>│  channel) │
//! └──────────────┘             └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Sync(SyncEvent::LibrarySynced)).ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event, CoreEvent::Sync(SyncEvent::LibrarySynced));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns an error which publishers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Sync job lifecycle events
    Sync(SyncEvent),
    /// Queue control events
    Queue(QueueEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Queue(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::JobFailed { .. }) => EventSeverity::Error,
            CoreEvent::Sync(SyncEvent::JobRetrying { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::LibrarySynced) => EventSeverity::Info,
            CoreEvent::Queue(QueueEvent::Rebuilt { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

/// Events describing the lifecycle of queued sync jobs.
///
/// `job_key` is the identity key of the job, e.g. `upload/Books/dune.m4b`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    /// A job was accepted into the queue.
    JobScheduled {
        job_key: String,
        /// The job type identifier (`upload`, `update`, ...).
        job_type: String,
    },
    /// A job attempt is about to run.
    JobStarted {
        job_key: String,
        /// 1-based attempt number.
        attempt: u32,
    },
    /// An attempt failed and the job will run again after a delay.
    JobRetrying {
        job_key: String,
        failed_attempts: u32,
        retry_in_ms: u64,
        message: String,
    },
    /// The job's remote mutation was applied.
    JobSucceeded { job_key: String },
    /// The job exhausted its retries and was dropped.
    JobFailed {
        job_key: String,
        failed_attempts: u32,
        message: String,
    },
    /// The job was cancelled before it could finish.
    JobCancelled { job_key: String },
    /// The queue drained; every scheduled change reached the server.
    LibrarySynced,
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::JobScheduled { .. } => "Sync job scheduled",
            SyncEvent::JobStarted { .. } => "Sync job started",
            SyncEvent::JobRetrying { .. } => "Sync job will be retried",
            SyncEvent::JobSucceeded { .. } => "Sync job succeeded",
            SyncEvent::JobFailed { .. } => "Sync job failed",
            SyncEvent::JobCancelled { .. } => "Sync job cancelled",
            SyncEvent::LibrarySynced => "Library finished syncing",
        }
    }

    /// Identity key of the job this event is about, if any.
    pub fn job_key(&self) -> Option<&str> {
        match self {
            SyncEvent::JobScheduled { job_key, .. }
            | SyncEvent::JobStarted { job_key, .. }
            | SyncEvent::JobRetrying { job_key, .. }
            | SyncEvent::JobSucceeded { job_key }
            | SyncEvent::JobFailed { job_key, .. }
            | SyncEvent::JobCancelled { job_key } => Some(job_key),
            SyncEvent::LibrarySynced => None,
        }
    }
}

// ============================================================================
// Queue Events
// ============================================================================

/// Events about the job queue as a whole.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum QueueEvent {
    /// Dispatching paused; queued jobs are kept.
    Suspended,
    /// Dispatching resumed.
    Resumed,
    /// The queue was torn down and reloaded from durable storage.
    Rebuilt { pending: usize },
}

impl QueueEvent {
    fn description(&self) -> &str {
        match self {
            QueueEvent::Suspended => "Sync queue suspended",
            QueueEvent::Resumed => "Sync queue resumed",
            QueueEvent::Rebuilt { .. } => "Sync queue rebuilt",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning the bus is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// When a subscriber falls behind by more than `capacity` events it
    /// receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
