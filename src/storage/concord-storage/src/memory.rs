//! In-memory repository.
//!
//! Every operation runs under a single async mutex, so get-or-create is
//! atomic across concurrent tasks.
//!
//! With the `test-util` feature, calls are recorded so tests can assert
//! which repository operations a reconciliation pass performed, and team
//! creation can be made to fail.

use std::collections::{BTreeSet, HashMap};
#[cfg(any(test, feature = "test-util"))]
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::MembershipRepository;
use crate::error::RepositoryError;
use crate::models::{
    Ensured, Grant, MembershipTarget, Organization, OrganizationId, Team, TeamId, UserId,
};

/// A repository operation, as recorded by [`MemoryRepository`] when the
/// `test-util` feature is enabled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryCall {
    /// `find_organizations` with the requested names.
    FindOrganizations(Vec<String>),
    /// `find_teams` with the owning organization and requested names.
    FindTeams(OrganizationId, Vec<String>),
    /// `create_organization` with the requested name.
    CreateOrganization(String),
    /// `create_team` with the requested name and owner.
    CreateTeam(String, OrganizationId),
    /// `grant_membership` with the requested grant.
    GrantMembership(Grant),
}

#[derive(Default)]
struct State {
    next_id: i64,
    organizations: Vec<Organization>,
    teams: Vec<Team>,
    grants: BTreeSet<Grant>,
    #[cfg(any(test, feature = "test-util"))]
    calls: Vec<RepositoryCall>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    #[cfg(any(test, feature = "test-util"))]
    fn record(&mut self, call: impl FnOnce() -> RepositoryCall) {
        self.calls.push(call());
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn record(&mut self, _call: impl FnOnce() -> RepositoryCall) {}
}

/// Repository backed by process memory.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<State>,
    #[cfg(any(test, feature = "test-util"))]
    fail_team_creation: AtomicBool,
}

impl MemoryRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create_team` call fail with a connection error.
    #[cfg(any(test, feature = "test-util"))]
    pub fn fail_team_creation(&self, fail: bool) {
        self.fail_team_creation.store(fail, Ordering::SeqCst);
    }

    /// Returns the calls recorded since creation or the last [`Self::clear_calls`].
    #[cfg(any(test, feature = "test-util"))]
    pub async fn calls(&self) -> Vec<RepositoryCall> {
        self.state.lock().await.calls.clone()
    }

    /// Forgets recorded calls.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    #[cfg(any(test, feature = "test-util"))]
    fn injected_team_failure(&self) -> Result<(), RepositoryError> {
        if self.fail_team_creation.load(Ordering::SeqCst) {
            return Err(RepositoryError::ConnectionFailed(
                "team storage unavailable".into(),
            ));
        }
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn injected_team_failure(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Returns a snapshot of all organizations.
    pub async fn organizations(&self) -> Vec<Organization> {
        self.state.lock().await.organizations.clone()
    }

    /// Returns a snapshot of all teams.
    pub async fn teams(&self) -> Vec<Team> {
        self.state.lock().await.teams.clone()
    }
}

#[async_trait]
impl MembershipRepository for MemoryRepository {
    async fn find_organizations(
        &self,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, OrganizationId>, RepositoryError> {
        let mut state = self.state.lock().await;
        state.record(|| RepositoryCall::FindOrganizations(names.iter().cloned().collect()));

        Ok(state
            .organizations
            .iter()
            .filter(|org| names.contains(&org.name))
            .map(|org| (org.name.clone(), org.id))
            .collect())
    }

    async fn find_teams(
        &self,
        organization_id: OrganizationId,
        names: &BTreeSet<String>,
    ) -> Result<HashMap<String, TeamId>, RepositoryError> {
        let mut state = self.state.lock().await;
        state.record(|| RepositoryCall::FindTeams(organization_id, names.iter().cloned().collect()));

        Ok(state
            .teams
            .iter()
            .filter(|team| team.organization_id == organization_id && names.contains(&team.name))
            .map(|team| (team.name.clone(), team.id))
            .collect())
    }

    async fn create_organization(
        &self,
        name: &str,
    ) -> Result<Ensured<OrganizationId>, RepositoryError> {
        if name.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "organization name cannot be empty".into(),
            ));
        }

        let mut state = self.state.lock().await;
        state.record(|| RepositoryCall::CreateOrganization(name.to_string()));

        if let Some(org) = state.organizations.iter().find(|org| org.name == name) {
            return Ok(Ensured::existing(org.id));
        }

        let id = OrganizationId(state.allocate_id());
        state.organizations.push(Organization {
            id,
            name: name.to_string(),
        });
        debug!(organization = %name, %id, "Organization stored");
        Ok(Ensured::created(id))
    }

    async fn create_team(
        &self,
        name: &str,
        organization_id: OrganizationId,
    ) -> Result<Ensured<TeamId>, RepositoryError> {
        self.injected_team_failure()?;
        if name.is_empty() {
            return Err(RepositoryError::InvalidInput(
                "team name cannot be empty".into(),
            ));
        }

        let mut state = self.state.lock().await;
        state.record(|| RepositoryCall::CreateTeam(name.to_string(), organization_id));

        if !state
            .organizations
            .iter()
            .any(|org| org.id == organization_id)
        {
            return Err(RepositoryError::NotFound(format!(
                "organization {organization_id}"
            )));
        }

        if let Some(team) = state
            .teams
            .iter()
            .find(|team| team.name == name && team.organization_id == organization_id)
        {
            return Ok(Ensured::existing(team.id));
        }

        let id = TeamId(state.allocate_id());
        state.teams.push(Team {
            id,
            name: name.to_string(),
            organization_id,
        });
        debug!(team = %name, %id, %organization_id, "Team stored");
        Ok(Ensured::created(id))
    }

    async fn grant_membership(
        &self,
        user: &UserId,
        target: MembershipTarget,
        role: &str,
    ) -> Result<(), RepositoryError> {
        let grant = Grant {
            user: user.clone(),
            target,
            role: role.to_string(),
        };

        let mut state = self.state.lock().await;
        state.record(|| RepositoryCall::GrantMembership(grant.clone()));
        state.grants.insert(grant);
        Ok(())
    }

    async fn grants_of(&self, user: &UserId) -> Result<Vec<Grant>, RepositoryError> {
        let state = self.state.lock().await;
        Ok(state
            .grants
            .iter()
            .filter(|grant| &grant.user == user)
            .cloned()
            .collect())
    }
}
