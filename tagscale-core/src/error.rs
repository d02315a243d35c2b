//! Error types for Tagscale

use thiserror::Error;

/// Result type alias for Tagscale operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Tagscale error types
#[derive(Error, Debug)]
pub enum StorageError {
    /// Caller or configuration bug (empty matchers, unknown enum names, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Any failure talking to or executing against the backing store
    #[error("Storage I/O error: {0}")]
    Io(#[from] sqlx::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StorageError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(StorageError::Io(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!StorageError::invalid("empty matchers").is_retryable());
        assert!(!StorageError::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_io_keeps_source() {
        use std::error::Error as _;
        let err = StorageError::from(sqlx::Error::PoolClosed);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Storage I/O error"));
    }
}
