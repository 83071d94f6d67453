//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! the sync core consumes:
//! - `KeyValueStore` using an SQLite table (durable job queue)
//! - `SettingsStore` using an SQLite-backed key-value table
//! - `FileSystemAccess` using `tokio::fs` (including hard links)
//! - `NetworkMonitor` using a connectivity probe, plus a push-driven monitor
//!   for hosts that receive connectivity callbacks from the OS
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{SqliteKeyValueStore, SqliteSettingsStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let jobs = SqliteKeyValueStore::new(data_dir.join("jobs.db")).await?;
//!     let settings = SqliteSettingsStore::new(data_dir.join("settings.db")).await?;
//!     let fs = TokioFileSystem::new();
//!
//!     // Use in core configuration
//! }
//! ```

mod db;
mod filesystem;
mod kv_store;
mod network;
mod settings;

pub use filesystem::TokioFileSystem;
pub use kv_store::SqliteKeyValueStore;
pub use network::{DesktopNetworkMonitor, PushNetworkMonitor};
pub use settings::SqliteSettingsStore;
