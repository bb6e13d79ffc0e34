//! Claims processing entry point.

use std::sync::Arc;

use tracing::{debug, info};

use concord_storage::{MembershipRepository, UserId};

use crate::error::ClaimsError;
use crate::payload::ClaimsPayload;
use crate::reconciler::{ReconcileReport, Reconciler};
use crate::resolver::resolve;

/// Applies identity provider claims to the membership store.
///
/// Called once per successful external authentication, after the user has
/// been resolved and before a session is established.
#[derive(Clone)]
pub struct ClaimsProcessor {
    repository: Arc<dyn MembershipRepository>,
}

impl ClaimsProcessor {
    /// Creates a processor over the given repository.
    pub fn new(repository: Arc<dyn MembershipRepository>) -> Self {
        Self { repository }
    }

    /// Reconciles `user`'s organization and team memberships with `claims`.
    ///
    /// A payload with no organization or team membership is a no-op and
    /// performs no repository calls.
    ///
    /// # Errors
    ///
    /// Any error aborts the pass. Entities created before the failure are
    /// kept; a later pass picks them up instead of duplicating them.
    pub async fn process_organization_and_team_memberships(
        &self,
        claims: &ClaimsPayload,
        user: &UserId,
    ) -> Result<ReconcileReport, ClaimsError> {
        if claims.is_empty() {
            debug!(%user, "No membership claims to process");
            return Ok(ReconcileReport::default());
        }

        let resolved = resolve(claims)?;
        let report = Reconciler::new(self.repository.as_ref())
            .reconcile(user, &resolved)
            .await?;

        info!(
            %user,
            organizations_created = report.organizations_created,
            teams_created = report.teams_created,
            grants = report.grants_applied,
            "Processed membership claims"
        );

        Ok(report)
    }
}
