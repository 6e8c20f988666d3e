//! Common error types for GeneAtlas

use thiserror::Error;

/// Common result type for GeneAtlas operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error taxonomy across GeneAtlas services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested gene/genome/status/task/user absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Attempted review transition not allowed from the current state
    #[error("Invalid state transition: {0}")]
    InvalidState(String),

    /// Role or self-review violation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed input (empty rejection reason, unknown job kind, ...)
    #[error("Validation failed: {0}")]
    Validation(String),

    /// External provider or queue error, wrapping the original message
    #[error("Upstream failure: {0}")]
    Upstream(String),

    /// Detected cache/result-store mismatch; logged and self-healed
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
