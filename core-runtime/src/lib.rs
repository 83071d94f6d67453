//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the audiobook sync core:
//! - Logging and tracing infrastructure
//! - Configuration management (`CoreConfig` builder)
//! - Event bus for job lifecycle and library-synced notifications
//!
//! ## Overview
//!
//! Other crates depend on this one for the bridges a host injects, for the
//! logging conventions, and for broadcasting events to the UI layer.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{checked_relative_path, CoreConfig, CoreConfigBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, QueueEvent, SyncEvent};
