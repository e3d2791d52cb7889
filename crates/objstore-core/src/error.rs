//! Error types for the object storage core library.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the object storage library.
///
/// Every failure mode callers need to distinguish has its own variant, so
/// error handling never relies on string matching.
#[derive(Error, Debug)]
pub enum Error {
    /// Input failed validation (key, backend name, prefix, or metadata).
    /// Always returned before any storage access is attempted.
    #[error("validation error on {field}: {message}")]
    Validation {
        /// The input that failed validation ("key", "backend", "prefix", ...)
        field: &'static str,
        /// Which rule the input violated
        message: String,
    },

    /// Object does not exist
    #[error("object not found: {0}")]
    NotFound(String),

    /// The caller's cancellation signal fired before the operation ran
    #[error("operation cancelled")]
    Cancelled,

    /// Backend configuration error (missing or invalid settings)
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation attempted on a backend that was never configured
    #[error("backend not configured: {0} not set")]
    NotConfigured(&'static str),

    /// No backend registered under the given name
    #[error("unknown backend: {0}")]
    UnknownBackend(String),

    /// Backend type can only serve as an archive destination, not primary storage
    #[error("archive-only backend: {0}")]
    ArchiveOnlyBackend(String),

    /// Synchronous replication to a destination backend failed
    #[error("replication error: {0}")]
    Replication(String),

    /// Serialization error (policy files, metadata sidecars)
    #[error("serialization error: {0}")]
    Serialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl Error {
    /// True when the error means "the object does not exist".
    ///
    /// Convenience for callers that treat not-found as success, e.g.
    /// idempotent delete paths.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
