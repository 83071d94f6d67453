//! # Sync Job Model
//!
//! Describes one remote mutation waiting to be applied to the server.
//!
//! ## Overview
//!
//! A [`Job`] carries a typed [`JobPayload`], the policies that govern how the
//! queue runs it, and bookkeeping that survives restarts (`failed_attempts`,
//! `created_at`). Jobs are identified two ways:
//!
//! - [`JobId`]: unique per submission
//! - identity key: `"<jobType>/<relativePath>"`, unique per logical target.
//!   The queue holds at most one job per identity key.
//!
//! ## Lifecycle
//!
//! ```text
//! pending → running → succeeded
//!    ↑         ↓
//!    └── retrying ──→ failed (retries exhausted)
//!
//! pending | running → cancelled
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_sync::{Job, JobPayload, NetworkRequirement, RetryPolicy};
//!
//! let job = Job::new(
//!     JobPayload::Move {
//!         relative_path: "Inbox/dune.m4b".to_string(),
//!         origin: "Inbox".to_string(),
//!         destination: "Fiction".to_string(),
//!     },
//!     1_700_000_000_000,
//! )
//! .with_retry_policy(RetryPolicy::Unlimited)
//! .with_network_requirement(NetworkRequirement::Cellular);
//!
//! assert_eq!(job.identity_key, "move/Inbox/dune.m4b");
//! ```

use crate::item::{MetadataUpdate, SyncableItem};
use crate::{Result, SyncError};
use bridge_traits::NetworkInfo;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidJobId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Job Type
// ============================================================================

/// Closed set of remote mutations the queue knows how to apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    Upload,
    Move,
    Update,
    Delete,
    ShallowDelete,
    SetBookmark,
    DeleteBookmark,
}

impl JobType {
    /// Identifier used in identity keys and persisted blobs
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Upload => "upload",
            JobType::Move => "move",
            JobType::Update => "update",
            JobType::Delete => "delete",
            JobType::ShallowDelete => "shallowDelete",
            JobType::SetBookmark => "setBookmark",
            JobType::DeleteBookmark => "deleteBookmark",
        }
    }

    /// `"<identifier>/<relative_path>"`
    pub fn identity_key(&self, relative_path: &str) -> String {
        format!("{}/{}", self.as_str(), relative_path)
    }
}

impl FromStr for JobType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(JobType::Upload),
            "move" => Ok(JobType::Move),
            "update" => Ok(JobType::Update),
            "delete" => Ok(JobType::Delete),
            "shallowDelete" => Ok(JobType::ShallowDelete),
            "setBookmark" => Ok(JobType::SetBookmark),
            "deleteBookmark" => Ok(JobType::DeleteBookmark),
            _ => Err(SyncError::InvalidJobType(s.to_string())),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far a delete reaches on the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteMode {
    /// Remove the item and everything below it
    Deep,
    /// Remove a folder but keep its contents
    Shallow,
}

// ============================================================================
// Payload
// ============================================================================

/// Everything needed to rebuild the remote mutation after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum JobPayload {
    Upload {
        item: SyncableItem,
        /// Hard link outside the library tree that the upload reads from
        stable_copy: PathBuf,
    },
    Update {
        relative_path: String,
        changes: MetadataUpdate,
    },
    Move {
        relative_path: String,
        origin: String,
        destination: String,
    },
    Delete {
        relative_path: String,
    },
    ShallowDelete {
        relative_path: String,
    },
    SetBookmark {
        relative_path: String,
        /// Bookmark position in seconds
        time: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    DeleteBookmark {
        relative_path: String,
        time: f64,
    },
}

impl JobPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            JobPayload::Upload { .. } => JobType::Upload,
            JobPayload::Update { .. } => JobType::Update,
            JobPayload::Move { .. } => JobType::Move,
            JobPayload::Delete { .. } => JobType::Delete,
            JobPayload::ShallowDelete { .. } => JobType::ShallowDelete,
            JobPayload::SetBookmark { .. } => JobType::SetBookmark,
            JobPayload::DeleteBookmark { .. } => JobType::DeleteBookmark,
        }
    }

    /// Library path of the item the mutation targets
    pub fn relative_path(&self) -> &str {
        match self {
            JobPayload::Upload { item, .. } => &item.relative_path,
            JobPayload::Update { relative_path, .. }
            | JobPayload::Move { relative_path, .. }
            | JobPayload::Delete { relative_path }
            | JobPayload::ShallowDelete { relative_path }
            | JobPayload::SetBookmark { relative_path, .. }
            | JobPayload::DeleteBookmark { relative_path, .. } => relative_path,
        }
    }

    /// Build a delete payload for the given mode
    pub fn delete(relative_path: impl Into<String>, mode: DeleteMode) -> Self {
        let relative_path = relative_path.into();
        match mode {
            DeleteMode::Deep => JobPayload::Delete { relative_path },
            DeleteMode::Shallow => JobPayload::ShallowDelete { relative_path },
        }
    }
}

// ============================================================================
// Policies
// ============================================================================

/// How many times a failing job is run again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryPolicy {
    /// Retry until it succeeds or is cancelled
    Unlimited,
    /// Retry at most `n` times after the first attempt
    Limited(u32),
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `failed_attempts` failures
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        match self {
            RetryPolicy::Unlimited => true,
            RetryPolicy::Limited(max_retries) => failed_attempts <= *max_retries,
        }
    }

    /// Total attempts including the first, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        match self {
            RetryPolicy::Unlimited => None,
            RetryPolicy::Limited(max_retries) => Some(max_retries.saturating_add(1)),
        }
    }
}

/// Minimum connectivity a job needs before it may start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkRequirement {
    /// Any connection, metered or not
    Cellular,
    /// Unmetered connection (Wi-Fi or Ethernet)
    Wifi,
}

impl NetworkRequirement {
    pub fn is_satisfied_by(&self, info: &NetworkInfo) -> bool {
        match self {
            NetworkRequirement::Cellular => info.is_connected(),
            NetworkRequirement::Wifi => info.is_unmetered_link(),
        }
    }
}

// ============================================================================
// Job
// ============================================================================

/// A persisted unit of sync work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub identity_key: String,
    pub payload: JobPayload,
    pub retry_policy: RetryPolicy,
    pub network_requirement: NetworkRequirement,
    /// Replace a queued job with the same identity key instead of keeping it
    pub override_existing: bool,
    /// Failed executions so far
    pub failed_attempts: u32,
    /// Unix milliseconds; restores FIFO order after a restart
    pub created_at: i64,
    #[serde(default = "default_persisted")]
    pub persisted: bool,
}

fn default_persisted() -> bool {
    true
}

impl Job {
    /// New job with unlimited retries, any-network requirement and no override
    pub fn new(payload: JobPayload, created_at: i64) -> Self {
        let identity_key = payload.job_type().identity_key(payload.relative_path());
        Self {
            id: JobId::new(),
            identity_key,
            payload,
            retry_policy: RetryPolicy::Unlimited,
            network_requirement: NetworkRequirement::Cellular,
            override_existing: false,
            failed_attempts: 0,
            created_at,
            persisted: true,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_network_requirement(mut self, requirement: NetworkRequirement) -> Self {
        self.network_requirement = requirement;
        self
    }

    pub fn with_override(mut self, override_existing: bool) -> Self {
        self.override_existing = override_existing;
        self
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    pub fn relative_path(&self) -> &str {
        self.payload.relative_path()
    }

    /// 1-based number of the attempt about to run
    pub fn attempt(&self) -> u32 {
        self.failed_attempts.saturating_add(1)
    }

    /// Record a failed attempt and report whether the job may run again
    pub fn record_failure(&mut self) -> bool {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.retry_policy.allows_retry(self.failed_attempts)
    }
}
