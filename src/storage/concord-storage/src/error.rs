//! Repository error types.

use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Entity not found.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// Constraint violation unrelated to a get-or-create race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Connection error.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Query error.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Rejected input (empty name, bad path, etc.).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
