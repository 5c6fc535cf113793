//! Global error types for the PrayLock client core.
//!
//! All error categories across the engine are unified into a single
//! `PlError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using PlError.
pub type PlResult<T> = Result<T, PlError>;

/// Unified error type covering all error categories in the PrayLock core.
#[derive(Error, Debug)]
pub enum PlError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Storage errors --
    /// The durable key-value store failed an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// The secure storage backend failed or is unavailable.
    #[error("secure store error: {0}")]
    SecureStore(String),

    /// Legacy-to-secure storage migration failed.
    #[error("storage migration error: {0}")]
    Migration(String),

    // -- Network errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// HTTP request timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Realtime change-feed subscription error.
    #[error("realtime error: {0}")]
    Realtime(String),

    /// Realtime subscription dropped unexpectedly.
    #[error("realtime disconnected")]
    RealtimeDisconnected,

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // -- Queue errors --
    /// A retry-queue operation failed.
    #[error("queue error: {0}")]
    Queue(String),

    // -- Enforcement errors --
    /// The native app-blocking bridge reported a failure.
    #[error("blocking error: {0}")]
    Blocking(String),

    /// Enforcement reconciliation failed.
    #[error("enforcement error: {0}")]
    Enforcement(String),

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Service errors --
    /// A service failed to start.
    #[error("service start error: {0}")]
    ServiceStart(String),

    /// A service is not yet started.
    #[error("service not started: {0}")]
    ServiceNotStarted(String),

    /// A service operation failed.
    #[error("service error: {0}")]
    Service(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for PlError {
    fn from(e: serde_json::Error) -> Self {
        PlError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for PlError {
    fn from(e: toml::de::Error) -> Self {
        PlError::Config(e.to_string())
    }
}

impl PlError {
    /// Whether this error is plausibly transient (worth retrying).
    ///
    /// Unknown failures are treated as transient on purpose: the queues
    /// must retry rather than silently drop anything they cannot classify.
    pub fn is_transient(&self) -> bool {
        match self {
            PlError::Http(_) | PlError::Timeout(_) | PlError::RealtimeDisconnected => true,
            PlError::ServerError { status, .. } => *status >= 500,
            PlError::Config(_) | PlError::MissingConfig(_) | PlError::AuthFailed(_) => false,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlError::Config("bad value".to_string());
        assert_eq!(err.to_string(), "configuration error: bad value");

        let err = PlError::ServerError {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "server error (status 503): unavailable");
    }

    #[test]
    fn test_transient_classification() {
        assert!(PlError::Timeout("t".into()).is_transient());
        assert!(PlError::ServerError { status: 502, message: String::new() }.is_transient());
        assert!(!PlError::ServerError { status: 400, message: String::new() }.is_transient());
        assert!(!PlError::AuthFailed("nope".into()).is_transient());
        // Anything unclassified must stay retryable.
        assert!(PlError::Internal("?".into()).is_transient());
    }
}
