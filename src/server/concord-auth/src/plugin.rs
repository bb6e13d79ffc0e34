//! Authentication plugin trait.

use async_trait::async_trait;

use crate::{AuthError, AuthOutcome, ConfigField, Credential};

/// Trait for authentication plugins.
///
/// Implementations verify a provider credential and normalize it into an
/// [`AuthOutcome`]. The claims reconciliation that follows is provider
/// agnostic.
#[async_trait]
pub trait AuthenticationPlugin: Send + Sync {
    /// Verifies `credential` and returns the user context and claims.
    ///
    /// # Returns
    ///
    /// * `Ok(AuthOutcome)` - If the credential is valid
    /// * `Err(AuthError)` - If verification fails
    async fn authenticate(&self, credential: &Credential) -> Result<AuthOutcome, AuthError>;

    /// Describes the configuration fields this plugin accepts.
    fn configuration_schema(&self) -> Vec<ConfigField>;

    /// Returns the plugin type for logging/debugging.
    fn plugin_type(&self) -> &'static str;

    /// Plugin category.
    fn category(&self) -> &'static str {
        "sso"
    }
}
