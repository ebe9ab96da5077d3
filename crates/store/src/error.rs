//! Error types for the record store and connection pool

use std::time::Duration;
use thiserror::Error;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the store and its pool
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite database error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No pooled connection became free within the acquire timeout
    #[error("Connection pool exhausted: no connection available within {timeout:?}")]
    PoolExhausted { timeout: Duration },

    /// The backing database cannot be opened or reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid search query or pattern
    #[error("Invalid search query: {0}")]
    InvalidQuery(String),

    /// Database corruption or schema mismatch
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    ConnectionError(#[from] tokio_rusqlite::Error),
}

impl Error {
    /// Create a database error with a message
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a store unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Pool exhaustion or an unreachable store, as opposed to a failure of one query
    pub fn is_operational(&self) -> bool {
        matches!(self, Error::PoolExhausted { .. } | Error::StoreUnavailable(_))
    }
}
