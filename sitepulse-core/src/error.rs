//! Error types for sitepulse-core

use thiserror::Error;

/// Main error type for the sitepulse-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Durable queue storage error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Analytics backend error
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type alias for sitepulse-core
pub type Result<T> = std::result::Result<T, Error>;
