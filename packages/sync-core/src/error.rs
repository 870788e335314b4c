//! Centralized error types for the sync coordinator core.
//!
//! Each kind maps to a fixed recovery policy at the call site
//! (log-and-continue, close-this-session, or propagate-to-caller).

use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code, stable across versions.
    fn code(&self) -> &'static str;
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration supplied before `start()`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transient network failure (accept failure, partial read). The
    /// caller should log and keep serving other sessions.
    #[error("network transient error: {0}")]
    NetworkTransient(#[source] std::io::Error),

    /// Fatal network failure on the client side (control socket closed).
    #[error("network fatal error: {0}")]
    NetworkFatal(#[source] std::io::Error),

    /// Malformed frame, version mismatch, or extra bytes after hello.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Clock synchronisation did not complete in time.
    #[error("clock error: {0}")]
    Clock(String),

    /// The external media pipeline reported a state-change failure or bus
    /// error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// A drift-correction seek failed or returned early.
    #[error("seek error: {0}")]
    Seek(String),
}

impl ErrorCode for SyncError {
    fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::NetworkTransient(_) => "network_transient",
            Self::NetworkFatal(_) => "network_fatal",
            Self::Protocol(_) => "protocol_error",
            Self::Clock(_) => "clock_error",
            Self::Pipeline(_) => "pipeline_error",
            Self::Seek(_) => "seek_error",
        }
    }
}

/// Convenient Result alias for core operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_has_stable_code() {
        let err = SyncError::Config("missing playlist".into());
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn protocol_error_has_stable_code() {
        let err = SyncError::Protocol("version mismatch".into());
        assert_eq!(err.code(), "protocol_error");
    }
}
