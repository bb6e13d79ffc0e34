//! Login flow: authenticate, then reconcile memberships.

use std::sync::Arc;

use tracing::{error, info, warn};

use concord_claims::{ClaimsError, ClaimsProcessor};

use crate::{AuthContext, AuthError, AuthenticationPlugin, Credential};

/// Runs an authentication plugin and applies the resulting claims.
///
/// A login only succeeds if membership reconciliation succeeds too.
pub struct LoginFlow {
    plugin: Arc<dyn AuthenticationPlugin>,
    processor: ClaimsProcessor,
}

impl LoginFlow {
    /// Creates a flow for `plugin` that reconciles through `processor`.
    pub fn new(plugin: Arc<dyn AuthenticationPlugin>, processor: ClaimsProcessor) -> Self {
        Self { plugin, processor }
    }

    /// Authenticates `credential` and reconciles the user's memberships.
    ///
    /// # Errors
    ///
    /// Returns the plugin's error if authentication fails, or
    /// [`AuthError::Claims`] if reconciliation fails.
    pub async fn login(&self, credential: &Credential) -> Result<AuthContext, AuthError> {
        let outcome = self.plugin.authenticate(credential).await.map_err(|e| {
            warn!(plugin = self.plugin.plugin_type(), error = %e, "Authentication failed");
            e
        })?;

        let user = &outcome.context.user_id;
        if let Err(e) = self
            .processor
            .process_organization_and_team_memberships(&outcome.claims, user)
            .await
        {
            match &e {
                ClaimsError::MalformedClaims(detail) => {
                    warn!(%user, plugin = self.plugin.plugin_type(), %detail, "Rejected malformed membership claims");
                },
                ClaimsError::Consistency(detail) => {
                    error!(%user, %detail, "Membership reconciliation invariant violated");
                },
                ClaimsError::Repository(source) => {
                    error!(%user, error = %source, "Membership repository failure");
                },
            }
            return Err(e.into());
        }

        info!(%user, plugin = self.plugin.plugin_type(), "Login complete");
        Ok(outcome.context)
    }
}
