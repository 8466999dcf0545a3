//! Storage error types

use thiserror::Error;

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Could not open a connection to the backend
    #[error("Connection to {backend} failed: {message}")]
    Connection { backend: String, message: String },

    /// A command was rejected or the transport failed mid-command
    #[error("{command} on key '{key}' failed: {message}")]
    Command {
        command: &'static str,
        key: String,
        message: String,
    },

    #[error("Timed out after {waited_ms}ms waiting for a pooled connection")]
    PoolTimeout { waited_ms: u64 },

    #[error("Connection pool closed")]
    PoolClosed,
}

impl StoreError {
    pub fn connection(backend: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Connection {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn command(command: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        StoreError::Command {
            command,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Key the failing command addressed, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            StoreError::Command { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether the failure came from acquiring or opening a connection
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            StoreError::Connection { .. } | StoreError::PoolTimeout { .. } | StoreError::PoolClosed
        )
    }
}
