//! Relay error types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Malformed identifier or empty key/payload
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Target does not exist, never did, or is no longer visible
    #[error("Not found")]
    NotFound,

    /// Envelope was already handed out
    #[error("Already delivered")]
    AlreadyDelivered,

    /// Sender must wait before the next send
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Payload exceeds the configured ceiling
    #[error("Payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge { size: usize, max: usize },

    /// Store has no room for the payload
    #[error("Store full: {size} bytes requested, {available} available")]
    StoreFull { size: usize, available: u64 },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the caller should read this as "the message is gone".
    ///
    /// `NotFound` and `AlreadyDelivered` are kept apart for tests and logs
    /// but must look identical from outside.
    pub fn is_gone(&self) -> bool {
        matches!(self, RelayError::NotFound | RelayError::AlreadyDelivered)
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RelayError::InvalidInput(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_covers_both_absences() {
        assert!(RelayError::NotFound.is_gone());
        assert!(RelayError::AlreadyDelivered.is_gone());
        assert!(!RelayError::RateLimited { retry_after_secs: 3 }.is_gone());
    }

    #[test]
    fn test_rate_limited_message() {
        let err = RelayError::RateLimited { retry_after_secs: 4 };
        assert_eq!(err.to_string(), "Rate limited: retry after 4 seconds");
    }
}
