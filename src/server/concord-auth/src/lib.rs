//! # Concord Auth
//!
//! Authentication plugins that turn a verified identity provider login into
//! an [`AuthContext`] and a normalized [`concord_claims::ClaimsPayload`].
//!
//! ## Supported Providers
//!
//! - OIDC (ID token claims)
//! - GitHub (organization and team profile)
//!
//! [`LoginFlow`] runs a plugin and then reconciles the user's memberships.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod flow;
pub mod github;
pub mod oidc;
pub mod plugin;

pub use config::{ConfigField, FieldKind};
pub use context::{AuthContext, AuthMethod, AuthOutcome, Credential};
pub use error::AuthError;
pub use flow::LoginFlow;
pub use github::{GithubConfiguration, GithubPlugin};
pub use oidc::{OidcConfiguration, OidcPlugin};
pub use plugin::AuthenticationPlugin;
