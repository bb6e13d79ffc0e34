//! Organization and team reconciliation.
//!
//! Runs the load-existing / create-missing / grant protocol against a
//! [`MembershipRepository`]. Organizations are always settled before teams,
//! because a team cannot be created without its owner's id.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, error, info};

use concord_storage::{MembershipRepository, MembershipTarget, OrganizationId, TeamId, UserId};

use crate::error::ClaimsError;
use crate::resolver::ResolvedMemberships;

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Organizations found already present.
    pub organizations_existing: usize,
    /// Organizations inserted by this pass.
    pub organizations_created: usize,
    /// Teams found already present.
    pub teams_existing: usize,
    /// Teams inserted by this pass.
    pub teams_created: usize,
    /// Grants applied (including no-op re-grants).
    pub grants_applied: usize,
}

/// Name -> id maps for every organization and team of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedIds {
    /// Organization name -> id.
    pub organizations: HashMap<String, OrganizationId>,
    /// Team name -> id.
    pub teams: HashMap<String, TeamId>,
}

/// Drives one reconciliation pass over a repository.
pub struct Reconciler<'a> {
    repository: &'a dyn MembershipRepository,
}

impl<'a> Reconciler<'a> {
    /// Creates a reconciler over `repository`.
    pub fn new(repository: &'a dyn MembershipRepository) -> Self {
        Self { repository }
    }

    /// Returns the organizations among `names` that already exist.
    pub async fn load_existing_orgs(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, OrganizationId>, ClaimsError> {
        let names: BTreeSet<String> = names.iter().cloned().collect();
        let existing = self.repository.find_organizations(&names).await?;
        debug!(
            requested = names.len(),
            existing = existing.len(),
            "Loaded existing organizations"
        );
        Ok(existing)
    }

    /// Creates every organization in `names` that is not in `existing_orgs`.
    ///
    /// New ids are inserted into `existing_orgs`. Returns how many
    /// organizations this call inserted; an organization created concurrently
    /// by another login is not counted.
    pub async fn create_missing_orgs(
        &self,
        names: &[String],
        existing_orgs: &mut HashMap<String, OrganizationId>,
    ) -> Result<usize, ClaimsError> {
        let mut created = 0;
        for name in names {
            if existing_orgs.contains_key(name) {
                continue;
            }
            let ensured = self.repository.create_organization(name).await?;
            if ensured.created {
                info!(organization = %name, id = %ensured.id, "Created organization from claims");
                created += 1;
            } else {
                debug!(organization = %name, id = %ensured.id, "Organization created concurrently");
            }
            existing_orgs.insert(name.clone(), ensured.id);
        }
        Ok(created)
    }

    /// Returns the claimed teams that already exist under their hinted owner.
    ///
    /// Teams whose owner has no id yet are skipped; [`Self::create_missing_teams`]
    /// reports them.
    pub async fn load_existing_teams(
        &self,
        team_membership_map: &HashMap<String, String>,
        existing_orgs: &HashMap<String, OrganizationId>,
    ) -> Result<HashMap<String, TeamId>, ClaimsError> {
        let mut by_owner: BTreeMap<OrganizationId, BTreeSet<String>> = BTreeMap::new();
        for (team, owner) in team_membership_map {
            if let Some(id) = existing_orgs.get(owner) {
                by_owner.entry(*id).or_default().insert(team.clone());
            }
        }

        let mut existing = HashMap::new();
        for (organization_id, names) in &by_owner {
            existing.extend(self.repository.find_teams(*organization_id, names).await?);
        }

        debug!(
            requested = team_membership_map.len(),
            existing = existing.len(),
            "Loaded existing teams"
        );
        Ok(existing)
    }

    /// Creates every team in `team_names` that is not in `existing_teams`.
    ///
    /// Each team is created under the organization named in
    /// `team_membership_map`, whose id must already be in `existing_orgs`.
    /// New ids are inserted into `existing_teams`. Returns how many teams
    /// this call inserted.
    ///
    /// # Errors
    ///
    /// Returns [`ClaimsError::Consistency`] if a team has no owner in the map
    /// or its owner has no id.
    pub async fn create_missing_teams(
        &self,
        team_names: &[String],
        team_membership_map: &HashMap<String, String>,
        existing_orgs: &HashMap<String, OrganizationId>,
        existing_teams: &mut HashMap<String, TeamId>,
    ) -> Result<usize, ClaimsError> {
        let mut created = 0;
        for name in team_names {
            if existing_teams.contains_key(name) {
                continue;
            }

            let owner = team_membership_map.get(name).ok_or_else(|| {
                error!(team = %name, "Team has no owning organization in the membership map");
                ClaimsError::Consistency(format!("team {name:?} has no owning organization"))
            })?;
            let organization_id = existing_orgs.get(owner).copied().ok_or_else(|| {
                error!(team = %name, organization = %owner, "Owning organization was not resolved");
                ClaimsError::Consistency(format!(
                    "organization {owner:?} for team {name:?} was not resolved"
                ))
            })?;

            let ensured = self.repository.create_team(name, organization_id).await?;
            if ensured.created {
                info!(team = %name, organization = %owner, id = %ensured.id, "Created team from claims");
                created += 1;
            } else {
                debug!(team = %name, organization = %owner, id = %ensured.id, "Team created concurrently");
            }
            existing_teams.insert(name.clone(), ensured.id);
        }
        Ok(created)
    }

    /// Ensures every organization and team in `resolved` exists.
    pub async fn create_orgs_and_teams(
        &self,
        resolved: &ResolvedMemberships,
        report: &mut ReconcileReport,
    ) -> Result<ResolvedIds, ClaimsError> {
        let mut organizations = self.load_existing_orgs(&resolved.organization_names).await?;
        report.organizations_existing = organizations.len();
        report.organizations_created = self
            .create_missing_orgs(&resolved.organization_names, &mut organizations)
            .await?;

        let mut teams = self
            .load_existing_teams(&resolved.team_membership_map, &organizations)
            .await?;
        report.teams_existing = teams.len();
        report.teams_created = self
            .create_missing_teams(
                &resolved.team_names,
                &resolved.team_membership_map,
                &organizations,
                &mut teams,
            )
            .await?;

        Ok(ResolvedIds {
            organizations,
            teams,
        })
    }

    /// Grants the claimed roles on every resolved organization and team.
    pub async fn apply_memberships(
        &self,
        user: &UserId,
        resolved: &ResolvedMemberships,
        ids: &ResolvedIds,
    ) -> Result<usize, ClaimsError> {
        let mut applied = 0;

        for name in &resolved.organization_names {
            let Some(roles) = resolved.organization_roles.get(name) else {
                continue;
            };
            let id = ids.organizations.get(name).copied().ok_or_else(|| {
                ClaimsError::Consistency(format!("organization {name:?} was not resolved"))
            })?;
            for role in roles {
                self.repository
                    .grant_membership(user, MembershipTarget::Organization(id), role)
                    .await?;
                applied += 1;
            }
        }

        for name in &resolved.team_names {
            let Some(roles) = resolved.team_roles.get(name) else {
                continue;
            };
            let id = ids.teams.get(name).copied().ok_or_else(|| {
                ClaimsError::Consistency(format!("team {name:?} was not resolved"))
            })?;
            for role in roles {
                self.repository
                    .grant_membership(user, MembershipTarget::Team(id), role)
                    .await?;
                applied += 1;
            }
        }

        debug!(%user, grants = applied, "Applied membership grants");
        Ok(applied)
    }

    /// Runs the full protocol for `user`.
    pub async fn reconcile(
        &self,
        user: &UserId,
        resolved: &ResolvedMemberships,
    ) -> Result<ReconcileReport, ClaimsError> {
        let mut report = ReconcileReport::default();
        let ids = self.create_orgs_and_teams(resolved, &mut report).await?;
        report.grants_applied = self.apply_memberships(user, resolved, &ids).await?;
        Ok(report)
    }
}
