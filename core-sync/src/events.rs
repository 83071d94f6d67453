//! Publishes job lifecycle transitions on the core [`EventBus`].

use crate::queue::{JobListener, JobRunResult, TerminalOutcome};
use crate::Job;
use async_trait::async_trait;
use core_runtime::{CoreEvent, EventBus, SyncEvent};
use tracing::trace;

/// [`JobListener`] that mirrors every callback as a [`SyncEvent`]
#[derive(Debug, Clone)]
pub struct EventBusListener {
    bus: EventBus,
}

impl EventBusListener {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is not an error
        if self.bus.emit(CoreEvent::Sync(event)).is_err() {
            trace!("No event subscribers");
        }
    }
}

#[async_trait]
impl JobListener for EventBusListener {
    async fn on_scheduled(&self, job: &Job) {
        self.emit(SyncEvent::JobScheduled {
            job_key: job.identity_key.clone(),
            job_type: job.job_type().to_string(),
        });
    }

    async fn on_before_run(&self, job: &Job) {
        self.emit(SyncEvent::JobStarted {
            job_key: job.identity_key.clone(),
            attempt: job.attempt(),
        });
    }

    async fn on_after_run(&self, job: &Job, result: &JobRunResult) {
        if let JobRunResult::Retrying { error, retry_in } = result {
            self.emit(SyncEvent::JobRetrying {
                job_key: job.identity_key.clone(),
                failed_attempts: job.failed_attempts,
                retry_in_ms: u64::try_from(retry_in.as_millis()).unwrap_or(u64::MAX),
                message: error.clone(),
            });
        }
    }

    async fn on_terminated(&self, job: &Job, outcome: &TerminalOutcome) {
        let event = match outcome {
            TerminalOutcome::Succeeded => SyncEvent::JobSucceeded {
                job_key: job.identity_key.clone(),
            },
            TerminalOutcome::Failed { error } => SyncEvent::JobFailed {
                job_key: job.identity_key.clone(),
                failed_attempts: job.failed_attempts,
                message: error.clone(),
            },
        };
        self.emit(event);
    }

    async fn on_cancelled(&self, identity_key: &str) {
        self.emit(SyncEvent::JobCancelled {
            job_key: identity_key.to_string(),
        });
    }
}
