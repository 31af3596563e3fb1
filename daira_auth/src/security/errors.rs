//! Error types for security module

use thiserror::Error;

use crate::db::timeouts::TimeoutError;

/// Result type for counter store operations
pub type CounterStoreResult<T> = Result<T, CounterStoreError>;

/// Counter store errors
#[derive(Debug, Error)]
pub enum CounterStoreError {
    /// Could not obtain a connection
    #[error("Counter store connection failed: {0}")]
    Connection(String),

    /// A command was rejected or failed mid-flight
    #[error("Counter store command failed: {0}")]
    Command(String),

    /// The call did not complete in time
    #[error("Counter store timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<TimeoutError<CounterStoreError>> for CounterStoreError {
    fn from(err: TimeoutError<CounterStoreError>) -> Self {
        match err {
            TimeoutError::Timeout(duration) => CounterStoreError::Timeout(duration),
            TimeoutError::Inner(inner) => inner,
        }
    }
}

/// A rate limit override that is not a positive integer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid rate limit {var}: '{value}' is not a positive integer")]
pub struct InvalidRateLimit {
    pub var: String,
    pub value: String,
}
