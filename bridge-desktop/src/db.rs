//! SQLite connection helpers shared by the desktop stores.

use bridge_traits::error::{BridgeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open (creating if needed) a database file.
pub(crate) async fn connect_file(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(BridgeError::Io)?;
    }

    // Convert path to string, replacing backslashes with forward slashes for SQLite URL
    let path_str = db_path.to_string_lossy().replace('\\', "/");
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path_str))
        .map_err(|e| BridgeError::DatabaseError(format!("Invalid database path: {}", e)))?
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))
}

/// Open a private in-memory database.
///
/// The pool is pinned to a single connection; every SQLite connection to
/// `:memory:` would otherwise see its own empty database.
pub(crate) async fn connect_memory() -> Result<SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))
}

/// Current Unix timestamp in seconds
pub(crate) fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
