//! Error types for queue and store operations.

use thiserror::Error;

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("push transaction aborted by a concurrent writer")]
    PushConflict,

    #[error("message not found: {id}")]
    MessageNotFound { id: String },

    #[error("invalid retry limit: {value}")]
    InvalidRetryLimit { value: i64 },

    #[error("update transform returned an invalid result for message '{id}'")]
    InvalidTransform { id: String },

    #[error("retry limit of {limit} exhausted after {attempts} attempts")]
    RetryLimitExceeded { limit: i64, attempts: u64 },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and the whole operation is worth retrying
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PushConflict => true,
            Self::MessageNotFound { .. } => false,
            Self::InvalidRetryLimit { .. } => false,
            Self::InvalidTransform { .. } => false,
            Self::RetryLimitExceeded { .. } => true,
            Self::Store(err) => err.is_transient(),
            Self::Validation(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }
}

/// Failures reported by a [`TransactionalStore`](crate::store::TransactionalStore)
/// adapter.
///
/// Adapters must absorb driver-specific quirks and surface either a correct
/// result or one of these variants; the queue never works around a driver bug
/// itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("store driver error: {message}")]
    Driver { message: String },

    #[error("store returned a malformed response: {message}")]
    MalformedResponse { message: String },
}

impl StoreError {
    /// Check if the failure is worth retrying at the call site
    pub fn is_transient(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } => true,
            Self::Driver { .. } => true,
            Self::MalformedResponse { .. } => false,
        }
    }
}

/// Validation errors raised before any store access
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("required field missing: {field}")]
    Required { field: String },

    #[error("invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
