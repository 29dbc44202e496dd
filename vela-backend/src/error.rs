//! Backend reconciliation error types

use thiserror::Error;

/// Errors that can occur while reconciling a remote-state backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// A field the backend kind requires is absent from the configuration
    #[error("Missing required field {field} for {backend} remote state")]
    MissingField {
        backend: &'static str,
        field: &'static str,
    },

    /// Credentials or profile are insufficient for the resource
    #[error("Permission denied for {resource}: {message}")]
    Permission { resource: String, message: String },

    /// A remote-store call exceeded the bounded timeout (retryable)
    #[error("Remote store call timed out during {operation}")]
    Timeout { operation: &'static str },

    /// A transient network or service failure (retryable)
    #[error("Transient remote store failure: {0}")]
    Transient(String),

    /// Creating a bucket or lock table failed
    #[error("Failed to create {resource}: {message}")]
    CreationFailed { resource: String, message: String },

    /// The backend kind has no store implementation
    #[error("Unsupported remote store: {0}")]
    UnsupportedStore(String),

    /// The spec or client configuration is invalid
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// Any other remote store error
    #[error("Remote store error: {0}")]
    Store(String),
}

impl BackendError {
    /// Whether the invoking command may retry the operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transient(_))
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
