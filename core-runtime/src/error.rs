use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors raised while assembling the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host bridge was neither injected nor defaulted
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    /// A default bridge failed to initialize
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A library-relative path that would resolve outside its root
    #[error("Invalid relative path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
