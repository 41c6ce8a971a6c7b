//! Error types for Statboard

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the read-model engine
#[derive(Error, Debug)]
pub enum Error {
    /// Domain violation such as a double like or an unlike without a like.
    /// Recoverable: the caller made a request the current state does not allow.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    // =========================================================================
    // Cache Store Errors
    // =========================================================================
    /// Transport failure talking to the cache store
    #[error("Cache store unavailable: {0}")]
    CacheUnavailable(String),

    /// The cache store answered, but not in the shape we asked for
    #[error("Cache store error: {0}")]
    CacheStore(String),

    // =========================================================================
    // Durable Store Errors
    // =========================================================================
    /// Durable store lookup or write failed
    #[error("Durable store error: {0}")]
    DurableStore(String),

    /// Snapshot payload (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures of the cache transport itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::CacheUnavailable(_))
    }

    /// True for recoverable domain violations.
    pub fn is_domain_violation(&self) -> bool {
        matches!(self, Error::InvalidOperation(_))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
