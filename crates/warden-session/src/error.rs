//! Error types
//!
//! `BackendError` is what the external backend can report.
//! `SessionError` is what the public session operations return.

use crate::config::ConfigError;

/// Failure reported by a backend operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Transport or IPC failure, the backend never answered
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered and refused the request
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// Malformed input, e.g. an unknown server id
    #[error("Validation error: {0}")]
    Validation(String),
}

impl BackendError {
    /// Check if retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Session operation errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A pending connect was superseded by a disconnect
    #[error("Connect cancelled by disconnect request")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SessionError {
    /// The backend error behind this failure, if any
    pub fn backend(&self) -> Option<&BackendError> {
        match self {
            SessionError::Backend(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Rejected("server full".into());
        assert_eq!(err.to_string(), "Operation rejected: server full");
        assert!(!err.is_transient());
        assert!(BackendError::Unavailable("ipc closed".into()).is_transient());
    }

    #[test]
    fn test_session_error_from_backend() {
        let err: SessionError = BackendError::Validation("unknown server".into()).into();

        assert_eq!(err.to_string(), "Validation error: unknown server");
        assert_eq!(
            err.backend(),
            Some(&BackendError::Validation("unknown server".into()))
        );
        assert!(!err.is_cancelled());
        assert!(SessionError::Cancelled.backend().is_none());
    }
}
