//! Authentication context types.

use serde::{Deserialize, Serialize};

use concord_claims::ClaimsPayload;
use concord_storage::UserId;

/// Method used to authenticate the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// OpenID Connect ID token.
    OpenIdConnect,
    /// GitHub OAuth2 profile.
    Github,
}

/// Verified credential handed to a plugin.
#[derive(Debug, Clone)]
pub enum Credential {
    /// A signed ID token (JWT).
    IdToken(String),
    /// A provider profile document fetched after the OAuth2 exchange.
    Profile(serde_json::Value),
}

/// Authenticated user context.
///
/// This struct contains information about the authenticated user and is
/// returned to the caller after successful authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// Local user identifier (from the configured id claim).
    pub user_id: UserId,

    /// Username, when the provider supplies one.
    pub username: Option<String>,

    /// Email address (for audit purposes).
    pub email: Option<String>,

    /// Display name.
    pub display_name: Option<String>,

    /// Authentication method used.
    pub auth_method: AuthMethod,

    /// Token expiration timestamp (Unix seconds).
    pub expires_at: Option<u64>,
}

/// Result of a successful plugin authentication.
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    /// Who logged in.
    pub context: AuthContext,
    /// Membership claims asserted by the provider.
    pub claims: ClaimsPayload,
}
