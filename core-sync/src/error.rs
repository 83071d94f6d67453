use bridge_traits::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The stable upload copy could not be created
    #[error("File system error at {path}: {message}")]
    FileSystem { path: String, message: String },

    /// The durable job store could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The remote mutation failed; retried per the job's policy
    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A relative path that is empty, absolute or climbs out of its root
    #[error("Invalid relative path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Job queue has been shut down")]
    QueueShutdown,

    #[error("Invalid job ID: {0}")]
    InvalidJobId(String),

    #[error("Invalid job type: {0}")]
    InvalidJobType(String),
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<core_runtime::Error> for SyncError {
    fn from(err: core_runtime::Error) -> Self {
        match err {
            core_runtime::Error::InvalidPath { path, reason } => {
                SyncError::InvalidPath { path, reason }
            }
            other => SyncError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
