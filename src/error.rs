//! # Store Error Types
//!
//! The closed set of errors every backend surfaces to callers.
//! Native SDK errors are classified into these kinds at the adapter boundary.

use thiserror::Error;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors returned by [`crate::Store`] operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Secret id failed the key validator; nothing was sent to the backend
    #[error("invalid secret id: {0}")]
    Validation(String),

    /// Secret or version does not exist, or the secret is deleted
    #[error("secret not found: {0}")]
    NotFound(String),

    /// Transport, permission or throttling failure from the backend
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Operation not available on this backend
    #[error("{operation} is not supported by the {backend} backend")]
    NotSupported {
        backend: &'static str,
        operation: &'static str,
    },
}

impl StoreError {
    pub fn not_found(what: impl Into<String>) -> Self {
        StoreError::NotFound(what.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    /// Whether retrying the failed call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Backend(e) if e.transient)
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::Validation(_) => "validation",
            StoreError::NotFound(_) => "not_found",
            StoreError::Backend(_) => "backend",
            StoreError::NotSupported { .. } => "not_supported",
        }
    }
}

/// Backend failure with transient/permanent classification
#[derive(Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct BackendError {
    pub operation: String,
    pub message: String,
    /// Throttling, timeouts and 5xx responses
    pub transient: bool,
}

impl BackendError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: true,
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            transient: false,
        }
    }
}
