//! Membership resolution.
//!
//! Pure computation: derives the entities a claims payload needs and the
//! roles to grant, without touching the repository. All validation happens
//! here so malformed claims fail before anything is created.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::ClaimsError;
use crate::payload::ClaimsPayload;

/// Entities and grants derived from a claims payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedMemberships {
    /// Organizations that must exist, deduplicated, in first-seen order.
    ///
    /// Organizations claimed directly come first, followed by organizations
    /// only referenced as a team owner.
    pub organization_names: Vec<String>,
    /// Teams that must exist, in first-seen order.
    pub team_names: Vec<String>,
    /// Team name -> owning organization name.
    pub team_membership_map: HashMap<String, String>,
    /// Roles to grant per organization.
    pub organization_roles: HashMap<String, Vec<String>>,
    /// Roles to grant per team.
    pub team_roles: HashMap<String, Vec<String>>,
}

/// Deduplicates roles, keeping first occurrences.
fn unique_roles(roles: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    roles
        .iter()
        .filter(|role| seen.insert(role.as_str()))
        .cloned()
        .collect()
}

/// Resolves a claims payload into the organizations, teams and grants it implies.
///
/// # Errors
///
/// Returns [`ClaimsError::MalformedClaims`] if a name is empty, a claimed
/// team has no owning organization hint, or a team name was claimed under
/// more than one organization.
pub fn resolve(claims: &ClaimsPayload) -> Result<ResolvedMemberships, ClaimsError> {
    if let Some((name, owners)) = claims.conflicting_teams().next() {
        let owners: Vec<&str> = owners.iter().map(String::as_str).collect();
        return Err(ClaimsError::MalformedClaims(format!(
            "team {name:?} is claimed under more than one organization: {}",
            owners.join(", ")
        )));
    }

    let mut resolved = ResolvedMemberships::default();
    let mut seen_orgs = HashSet::new();

    for (name, roles) in claims.organization_membership.iter() {
        if name.is_empty() {
            return Err(ClaimsError::MalformedClaims(
                "organization name cannot be empty".into(),
            ));
        }
        if seen_orgs.insert(name.to_string()) {
            resolved.organization_names.push(name.to_string());
        }
        resolved
            .organization_roles
            .insert(name.to_string(), unique_roles(roles));
    }

    for (name, roles) in claims.team_membership.iter() {
        if name.is_empty() {
            return Err(ClaimsError::MalformedClaims(
                "team name cannot be empty".into(),
            ));
        }

        let organization = match claims.team_organization.get(name) {
            Some(org) if !org.is_empty() => org,
            _ => {
                return Err(ClaimsError::MalformedClaims(format!(
                    "team {name:?} has no owning organization"
                )))
            },
        };

        if seen_orgs.insert(organization.clone()) {
            resolved.organization_names.push(organization.clone());
        }
        resolved.team_names.push(name.to_string());
        resolved
            .team_membership_map
            .insert(name.to_string(), organization.clone());
        resolved
            .team_roles
            .insert(name.to_string(), unique_roles(roles));
    }

    debug!(
        organizations = resolved.organization_names.len(),
        teams = resolved.team_names.len(),
        "Resolved membership claims"
    );

    Ok(resolved)
}
