//! Repository trait definition.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use crate::error::RepositoryError;
use crate::models::{Ensured, Grant, MembershipTarget, OrganizationId, TeamId, UserId};

/// Persistence seam for organizations, teams and membership grants.
///
/// Implementations must make `create_organization` and `create_team` atomic
/// get-or-create operations: two callers racing on the same key both observe
/// the same id, only one entity exists afterwards, and only the caller that
/// inserted it sees `created` set.
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// Returns the organizations among `names` that already exist.
    ///
    /// Names that do not exist are absent from the result.
    async fn find_organizations(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, OrganizationId>, RepositoryError>;

    /// Returns the teams among `names` that already exist under `organization_id`.
    async fn find_teams(
        &self,
        organization_id: OrganizationId,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, TeamId>, RepositoryError>;

    /// Gets or creates the organization called `name`.
    async fn create_organization(
        &self,
        name: &str,
    ) -> Result<Ensured<OrganizationId>, RepositoryError>;

    /// Gets or creates the team `name` owned by `organization_id`.
    async fn create_team(
        &self,
        name: &str,
        organization_id: OrganizationId,
    ) -> Result<Ensured<TeamId>, RepositoryError>;

    /// Grants `role` on `target` to `user`. Granting a held role is a no-op.
    async fn grant_membership(
        &self,
        user: &UserId,
        target: MembershipTarget,
        role: &str,
    ) -> Result<(), RepositoryError>;

    /// Returns every grant held by `user`.
    async fn grants_of(&self, user: &UserId) -> Result<Vec<Grant>, RepositoryError>;
}
