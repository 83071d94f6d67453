//! # Core Configuration Module
//!
//! Provides configuration management for the audiobook sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds every bridge and directory the sync core needs. It
//! enforces fail-fast validation so that missing capabilities are reported at
//! startup rather than when the first job runs.
//!
//! ## Required Settings
//!
//! - `library_dir` - Root of the user's audiobook library
//! - `uploads_dir` - Directory for stable hard-linked upload copies. Must live
//!   outside the library tree so renames inside the library never touch it.
//!
//! ## Required Bridges (with desktop defaults)
//!
//! - `KeyValueStore` - Durable job queue storage
//! - `SettingsStore` - Persisted UI flags (e.g. "has queued jobs")
//! - `FileSystemAccess` - Hard links and deletes for upload copies
//! - `NetworkMonitor` - Wi-Fi/cellular gating
//!
//! When the `desktop-shims` feature is enabled, SQLite stores, a Tokio file
//! system and a probing network monitor are injected automatically if not
//! provided. The SQLite files live next to `database_path`.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .library_dir("/data/library")
//!     .uploads_dir("/data/uploads")
//!     .key_value_store(Arc::new(MyStore))
//!     .settings_store(Arc::new(MySettings))
//!     .file_system(Arc::new(MyFileSystem))
//!     .network_monitor(Arc::new(MyNetworkMonitor))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{
    Clock, FileSystemAccess, KeyValueStore, NetworkMonitor, SettingsStore, SystemClock,
};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Core configuration for the audiobook sync core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root of the local library; relative paths resolve against it
    pub library_dir: PathBuf,

    /// Directory holding stable copies of files waiting to upload
    pub uploads_dir: PathBuf,

    /// Durable storage for queued jobs
    pub key_value_store: Arc<dyn KeyValueStore>,

    /// Persisted flags shown in the UI
    pub settings_store: Arc<dyn SettingsStore>,

    /// File system access for stable upload copies
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Network connectivity monitor
    pub network_monitor: Arc<dyn NetworkMonitor>,

    /// Time source for job timestamps
    pub clock: Arc<dyn Clock>,

    /// Bus for job lifecycle and library-synced events
    pub event_bus: EventBus,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("library_dir", &self.library_dir)
            .field("uploads_dir", &self.uploads_dir)
            .field("key_value_store", &"KeyValueStore { ... }")
            .field("settings_store", &"SettingsStore { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("network_monitor", &"NetworkMonitor { ... }")
            .field("event_bus", &self.event_bus)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Directories are not empty
    /// - The uploads directory is not the library directory
    /// - The uploads directory is not nested inside the library
    pub fn validate(&self) -> Result<()> {
        if self.library_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Library directory cannot be empty".to_string(),
            ));
        }

        if self.uploads_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Uploads directory cannot be empty".to_string(),
            ));
        }

        if self.uploads_dir == self.library_dir {
            return Err(Error::Config(
                "Uploads directory must differ from the library directory".to_string(),
            ));
        }

        if self.uploads_dir.starts_with(&self.library_dir) {
            return Err(Error::Config(format!(
                "Uploads directory {} must live outside the library tree {}",
                self.uploads_dir.display(),
                self.library_dir.display()
            )));
        }

        Ok(())
    }

    /// Absolute path of a library item
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if `relative_path` would escape the library
    pub fn library_path(&self, relative_path: &str) -> Result<PathBuf> {
        Ok(self.library_dir.join(checked_relative_path(relative_path)?))
    }

    /// Absolute path of the stable upload copy for a library item
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPath`] if `relative_path` would escape the uploads directory
    pub fn upload_copy_path(&self, relative_path: &str) -> Result<PathBuf> {
        Ok(self.uploads_dir.join(checked_relative_path(relative_path)?))
    }
}

/// Accept only non-empty paths made of plain name components
///
/// Absolute paths, prefixes, `.` and `..` are rejected, so joining the result
/// onto a root directory always stays beneath it.
///
/// # Errors
///
/// Returns [`Error::InvalidPath`] describing the offending component
pub fn checked_relative_path(relative_path: &str) -> Result<&Path> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: relative_path.to_string(),
        reason: reason.to_string(),
    };

    let path = Path::new(relative_path);
    let mut components = path.components().peekable();
    if components.peek().is_none() {
        return Err(invalid("path is empty"));
    }

    for component in components {
        match component {
            Component::Normal(_) => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("path must be relative"))
            }
            Component::CurDir | Component::ParentDir => {
                return Err(invalid("path must not contain '.' or '..'"))
            }
        }
    }
    Ok(path)
}

#[cfg(not(feature = "desktop-shims"))]
fn capability_missing(capability: &str, purpose: &str, mobile_hint: &str) -> Error {
    Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!(
            "{capability} implementation is required for {purpose}. \
             Desktop: enable the 'desktop-shims' feature and set .database_path(). \
             Mobile: {mobile_hint}."
        ),
    }
}

/// Bridges the builder could not find and asked the platform to provide.
#[derive(Default)]
struct MissingBridges {
    key_value_store: bool,
    settings_store: bool,
    file_system: bool,
    network_monitor: bool,
}

impl MissingBridges {
    fn any(&self) -> bool {
        self.key_value_store || self.settings_store || self.file_system || self.network_monitor
    }
}

/// Platform defaults filled in for missing bridges
#[derive(Default)]
struct DefaultBridges {
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_defaults(
    missing: &MissingBridges,
    _database_path: Option<&Path>,
    _uploads_dir: &Path,
) -> Result<DefaultBridges> {
    if missing.key_value_store {
        return Err(capability_missing(
            "KeyValueStore",
            "durable job persistence",
            "inject a store backed by the platform database",
        ));
    }
    if missing.settings_store {
        return Err(capability_missing(
            "SettingsStore",
            "persisted sync flags",
            "inject platform-native settings (UserDefaults/DataStore)",
        ));
    }
    if missing.file_system {
        return Err(capability_missing(
            "FileSystemAccess",
            "stable upload copies",
            "inject a sandbox-aware file system bridge",
        ));
    }
    if missing.network_monitor {
        return Err(capability_missing(
            "NetworkMonitor",
            "Wi-Fi gating of uploads",
            "inject NWPathMonitor/ConnectivityManager callbacks",
        ));
    }
    Ok(DefaultBridges::default())
}

#[cfg(feature = "desktop-shims")]
fn provide_defaults(
    missing: &MissingBridges,
    database_path: Option<&Path>,
    uploads_dir: &Path,
) -> Result<DefaultBridges> {
    use bridge_desktop::{
        DesktopNetworkMonitor, SqliteKeyValueStore, SqliteSettingsStore, TokioFileSystem,
    };
    use std::thread;
    use tokio::runtime::{Builder, Handle};

    let mut defaults = DefaultBridges::default();

    if missing.file_system {
        let data_dir = uploads_dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| uploads_dir.to_path_buf());
        defaults.file_system = Some(Arc::new(TokioFileSystem::with_data_directory(data_dir)));
    }

    if missing.network_monitor {
        defaults.network_monitor = Some(Arc::new(DesktopNetworkMonitor::new()));
    }

    if !missing.key_value_store && !missing.settings_store {
        return Ok(defaults);
    }

    let database_path = database_path.ok_or_else(|| {
        Error::Config(
            "Database path is required for the desktop stores. Use .database_path() to set it."
                .to_string(),
        )
    })?;
    let settings_path = database_path.with_file_name("settings.db");
    let jobs_path = database_path.to_path_buf();
    let want_jobs = missing.key_value_store;
    let want_settings = missing.settings_store;

    let init_stores = move || -> Result<(Option<SqliteKeyValueStore>, Option<SqliteSettingsStore>)> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::Internal(format!(
                    "Failed to create Tokio runtime for default stores: {}",
                    e
                ))
            })?;

        runtime.block_on(async move {
            let jobs = match want_jobs {
                true => Some(SqliteKeyValueStore::new(jobs_path).await?),
                false => None,
            };
            let settings = match want_settings {
                true => Some(SqliteSettingsStore::new(settings_path).await?),
                false => None,
            };
            Ok((jobs, settings))
        })
    };

    // block_on panics inside a runtime, so hop to a plain thread there
    let (jobs, settings) = match Handle::try_current() {
        Ok(_) => thread::spawn(init_stores).join().map_err(|_| {
            Error::Internal("Thread panicked while creating default stores".to_string())
        })??,
        Err(_) => init_stores()?,
    };

    if let Some(store) = jobs {
        defaults.key_value_store = Some(Arc::new(store));
    }
    if let Some(store) = settings {
        defaults.settings_store = Some(Arc::new(store));
    }

    Ok(defaults)
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    library_dir: Option<PathBuf>,
    uploads_dir: Option<PathBuf>,
    database_path: Option<PathBuf>,
    key_value_store: Option<Arc<dyn KeyValueStore>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    clock: Option<Arc<dyn Clock>>,
    event_bus: Option<EventBus>,
}

impl CoreConfigBuilder {
    /// Sets the library root directory.
    pub fn library_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.library_dir = Some(path.into());
        self
    }

    /// Sets the directory for stable upload copies.
    pub fn uploads_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.uploads_dir = Some(path.into());
        self
    }

    /// Sets the SQLite file used by the desktop default stores.
    ///
    /// Only consulted when a store is not injected and `desktop-shims` is on.
    /// Settings go to a sibling `settings.db`.
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn key_value_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.key_value_store = Some(store);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Overrides the system clock (tests use a fixed clock).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Shares an existing event bus instead of creating one.
    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when a directory is missing or invalid
    /// - `Error::CapabilityMissing` when a bridge was not injected and no
    ///   platform default is available
    pub fn build(self) -> Result<CoreConfig> {
        let library_dir = self.library_dir.ok_or_else(|| {
            Error::Config("Library directory is required. Use .library_dir() to set it.".to_string())
        })?;

        let uploads_dir = self.uploads_dir.ok_or_else(|| {
            Error::Config("Uploads directory is required. Use .uploads_dir() to set it.".to_string())
        })?;

        let missing = MissingBridges {
            key_value_store: self.key_value_store.is_none(),
            settings_store: self.settings_store.is_none(),
            file_system: self.file_system.is_none(),
            network_monitor: self.network_monitor.is_none(),
        };

        let defaults = if missing.any() {
            provide_defaults(&missing, self.database_path.as_deref(), &uploads_dir)?
        } else {
            DefaultBridges::default()
        };

        let config = CoreConfig {
            library_dir,
            uploads_dir,
            key_value_store: pick(self.key_value_store, defaults.key_value_store, "KeyValueStore")?,
            settings_store: pick(self.settings_store, defaults.settings_store, "SettingsStore")?,
            file_system: pick(self.file_system, defaults.file_system, "FileSystemAccess")?,
            network_monitor: pick(
                self.network_monitor,
                defaults.network_monitor,
                "NetworkMonitor",
            )?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_bus: self.event_bus.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}

fn pick<T: ?Sized>(injected: Option<Arc<T>>, default: Option<Arc<T>>, capability: &str) -> Result<Arc<T>> {
    injected.or(default).ok_or_else(|| Error::CapabilityMissing {
        capability: capability.to_string(),
        message: format!("No {} was injected and no platform default exists", capability),
    })
}
