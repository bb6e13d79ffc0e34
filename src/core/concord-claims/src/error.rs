//! Claims processing error types.

use thiserror::Error;

use concord_storage::RepositoryError;

/// Errors that abort a claims-processing pass.
#[derive(Debug, Error)]
pub enum ClaimsError {
    /// The identity provider sent claims that cannot be reconciled.
    #[error("malformed claims: {0}")]
    MalformedClaims(String),

    /// An internal invariant of the reconciliation protocol was violated.
    #[error("consistency error: {0}")]
    Consistency(String),

    /// Repository failure, propagated unchanged.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
