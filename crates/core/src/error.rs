// Error types for the synchronization engine

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by the store and its collaborators
#[derive(Debug, Error)]
pub enum SyncError {
    /// Non-2xx response or transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Mutation target absent (also the answer for ids owned by someone else)
    #[error("Notification not found: {0}")]
    NotFound(String),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        SyncError::Network(msg.into())
    }

    /// Create a not-found error
    pub fn not_found(id: impl Into<String>) -> Self {
        SyncError::NotFound(id.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        SyncError::Decode(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }

    pub fn is_network(&self) -> bool {
        matches!(self, SyncError::Network(_))
    }
}
