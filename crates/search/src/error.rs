//! Error types for caching, embedding and search

use std::time::Duration;
use thiserror::Error;

/// Result type for search operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Store or connection pool failure
    #[error(transparent)]
    Store(#[from] pocket_store::Error),

    /// Configuration or other core failure
    #[error(transparent)]
    Core(#[from] pocket_core::Error),

    /// Embedding generator failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// A relevance signal did not finish within its bounded wait
    #[error("{signal} signal timed out after {timeout:?}")]
    SignalTimeout { signal: &'static str, timeout: Duration },

    /// A relevance signal failed outside the store (panic, cancelled task)
    #[error("{signal} signal failed: {message}")]
    Signal { signal: &'static str, message: String },

    /// Persistent cache tier failure
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Pool exhaustion or an unreachable store; these fail the whole operation
    pub fn is_operational(&self) -> bool {
        matches!(self, Error::Store(e) if e.is_operational())
    }
}

impl From<tokio_rusqlite::Error> for Error {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Cache(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operational_errors() {
        let err: Error = pocket_store::Error::PoolExhausted { timeout: Duration::from_secs(1) }.into();
        assert!(err.is_operational());
        assert!(err.to_string().contains("pool exhausted"));

        let err: Error = pocket_store::Error::unavailable("gone").into();
        assert!(err.is_operational());

        let err: Error = pocket_store::Error::invalid_query("bad regex").into();
        assert!(!err.is_operational());
    }

    #[test]
    fn test_signal_errors_are_not_operational() {
        let err = Error::SignalTimeout { signal: "vector", timeout: Duration::from_secs(30) };
        assert!(!err.is_operational());
        assert_eq!(err.to_string(), "vector signal timed out after 30s");

        let err = Error::Signal { signal: "fuzzy", message: "task panicked".to_string() };
        assert!(err.to_string().contains("fuzzy"));
    }
}
