//! Error types for thinstore
//!
//! This module defines the error taxonomy shared by the storage manager,
//! its collaborators and the daemon.

use thiserror::Error;

/// Common result type for thinstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for thinstore
#[derive(Debug, Error)]
pub enum Error {
    // Namespace errors
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    // Capacity errors
    #[error("virtual quota exceeded: requested {requested} bytes, available {available} bytes")]
    QuotaExceeded { requested: u64, available: u64 },

    #[error("insufficient physical space: required {required} bytes, available {available} bytes")]
    InsufficientPhysicalSpace { required: u64, available: u64 },

    #[error("write of {length} bytes exceeds virtual size {virtual_size} of {path}")]
    ExceedsVirtualSize {
        path: String,
        length: u64,
        virtual_size: u64,
    },

    // Remote offload errors
    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),

    // Data errors
    #[error("corrupt file: {0}")]
    Corrupt(String),

    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a remote unavailable error
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::RemoteUnavailable(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// Physical space shortfalls clear after a rebalance/offload cycle and
    /// remote errors clear when the offload target comes back.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InsufficientPhysicalSpace { .. } | Self::RemoteUnavailable(_)
        )
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(
            Error::InsufficientPhysicalSpace {
                required: 10,
                available: 5
            }
            .is_retryable()
        );
        assert!(Error::remote("timeout").is_retryable());
        assert!(
            !Error::QuotaExceeded {
                requested: 10,
                available: 5
            }
            .is_retryable()
        );
        assert!(!Error::NotFound("a".into()).is_retryable());
    }

    #[test]
    fn test_error_not_found() {
        assert!(Error::NotFound("a".into()).is_not_found());
        assert!(!Error::AlreadyExists("a".into()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = Error::QuotaExceeded {
            requested: 100,
            available: 40,
        };
        assert_eq!(
            err.to_string(),
            "virtual quota exceeded: requested 100 bytes, available 40 bytes"
        );
    }
}
