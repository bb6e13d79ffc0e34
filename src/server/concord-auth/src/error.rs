//! Authentication error types.

use thiserror::Error;

use concord_claims::ClaimsError;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid credentials (bad token, wrong signature, etc.).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token has expired or is older than the allowed age.
    #[error("token expired")]
    TokenExpired,

    /// A required claim or profile field is missing.
    #[error("missing claim: {0}")]
    MissingClaim(String),

    /// The plugin does not accept this kind of credential.
    #[error("unsupported credential for {0}")]
    UnsupportedCredential(&'static str),

    /// Permission denied for the requested operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Plugin configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Membership reconciliation failed.
    #[error("membership reconciliation failed: {0}")]
    Claims(#[from] ClaimsError),
}
