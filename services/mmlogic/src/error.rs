//! Error types for the matchmaking logic API

use state_storage::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures raised while resolving a player pool.
///
/// `FilterEmpty` is not a failure from the caller's point of view: the pool
/// engine turns it into a successful empty roster.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("State storage error ({context}): {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("Filter '{filter_id}' on '{attribute}' matched no players")]
    FilterEmpty { filter_id: String, attribute: String },

    #[error("Filter '{filter_id}' on '{attribute}' matches {count} players, above the limit of {limit}")]
    FilterTooLarge {
        filter_id: String,
        attribute: String,
        count: u64,
        limit: u64,
    },

    #[error("Failed to send page {page} of pool '{pool_id}': {reason}")]
    StreamSend {
        pool_id: String,
        page: usize,
        reason: String,
    },
}

impl EngineError {
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        EngineError::Store {
            context: context.into(),
            source,
        }
    }

    /// Empty filters short-circuit to an empty roster instead of failing
    pub fn is_empty_result(&self) -> bool {
        matches!(self, EngineError::FilterEmpty { .. })
    }
}

/// Returned by a [`PageSink`](crate::engine::PageSink) that can no longer deliver pages
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct SinkError {
    pub reason: String,
}

impl SinkError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the API handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Profile '{profile_id}' has an undecodable player pool: {source}")]
    ProfileDecode {
        profile_id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ignore list '{0}' is not configured")]
    UnknownIgnoreList(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled by client")]
    Cancelled,
}

impl ApiError {
    pub fn store(context: impl Into<String>, source: StoreError) -> Self {
        ApiError::Engine(EngineError::store(context, source))
    }
}
