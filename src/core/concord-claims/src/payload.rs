//! Normalized claims payload handed over by authentication plugins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Membership claims keyed by organization or team name.
///
/// Keeps the order in which names appeared in the source document. A name
/// that appears twice has its role lists merged into the first entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleClaims(Vec<(String, Vec<String>)>);

impl RoleClaims {
    /// Creates an empty set of claims.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds roles for `name`, merging with an existing entry.
    pub fn insert<I, S>(&mut self, name: impl Into<String>, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => existing.extend(roles),
            None => self.0.push((name, roles)),
        }
    }

    /// Returns `true` if no names are claimed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates names and role lists in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0
            .iter()
            .map(|(name, roles)| (name.as_str(), roles.as_slice()))
    }
}

impl<N, I, S> FromIterator<(N, I)> for RoleClaims
where
    N: Into<String>,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (N, I)>>(iter: T) -> Self {
        let mut claims = Self::new();
        for (name, roles) in iter {
            claims.insert(name, roles);
        }
        claims
    }
}

impl Serialize for RoleClaims {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, roles) in &self.0 {
            map.serialize_entry(name, roles)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RoleClaims {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RoleClaimsVisitor;

        impl<'de> Visitor<'de> for RoleClaimsVisitor {
            type Value = RoleClaims;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of names to role lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut claims = RoleClaims::new();
                while let Some((name, roles)) = access.next_entry::<String, Vec<String>>()? {
                    claims.insert(name, roles);
                }
                Ok(claims)
            }
        }

        deserializer.deserialize_map(RoleClaimsVisitor)
    }
}

/// Claims payload produced by an authentication plugin.
///
/// `team_organization` pairs every claimed team with the name of the
/// organization that owns it. A team name can only have one owner per
/// payload; [`ClaimsPayload::with_team`] remembers names that were given a
/// second, different owner so resolution can reject them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPayload {
    /// Organization name -> roles.
    #[serde(default)]
    pub organization_membership: RoleClaims,
    /// Team name -> roles.
    #[serde(default)]
    pub team_membership: RoleClaims,
    /// Team name -> owning organization name.
    #[serde(default)]
    pub team_organization: HashMap<String, String>,
    #[serde(skip)]
    conflicting_teams: BTreeMap<String, BTreeSet<String>>,
}

impl ClaimsPayload {
    /// Creates an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an organization membership claim.
    pub fn with_organization<I, S>(mut self, name: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organization_membership.insert(name, roles);
        self
    }

    /// Adds a team membership claim together with its owner hint.
    ///
    /// Claiming a team name already held under a different organization
    /// keeps the first hint and records the conflict; see
    /// [`Self::conflicting_teams`].
    pub fn with_team<I, S>(
        mut self,
        name: impl Into<String>,
        organization: impl Into<String>,
        roles: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let organization = organization.into();
        match self.team_organization.get(&name) {
            Some(owner) if *owner != organization => {
                let owners = self.conflicting_teams.entry(name.clone()).or_default();
                owners.insert(owner.clone());
                owners.insert(organization);
            },
            Some(_) => {},
            None => {
                self.team_organization.insert(name.clone(), organization);
            },
        }
        self.team_membership.insert(name, roles);
        self
    }

    /// Team names claimed under more than one organization, with every
    /// organization they were claimed under.
    pub fn conflicting_teams(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.conflicting_teams
            .iter()
            .map(|(name, owners)| (name.as_str(), owners))
    }

    /// Returns `true` when neither organization nor team memberships are claimed.
    pub fn is_empty(&self) -> bool {
        self.organization_membership.is_empty() && self.team_membership.is_empty()
    }

    /// Parses a payload from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_keeps_document_order() {
        let payload = ClaimsPayload::from_json(
            r#"{
                "organization_membership": {"Zeta": ["member"], "Alpha": ["admin"], "Mu": []},
                "team_membership": {"Maintainers": ["member"]},
                "team_organization": {"Maintainers": "Zeta"}
            }"#,
        )
        .unwrap();

        let names: Vec<_> = payload
            .organization_membership
            .iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mu"]);
        assert_eq!(payload.team_organization["Maintainers"], "Zeta");
    }

    #[test]
    fn test_missing_keys_default_to_empty() {
        let payload = ClaimsPayload::from_json("{}").unwrap();
        assert!(payload.is_empty());
        assert!(payload.team_organization.is_empty());
    }

    #[test]
    fn test_duplicate_names_merge_roles() {
        let claims: RoleClaims = [("Galaxy", vec!["member"]), ("Galaxy", vec!["admin"])]
            .into_iter()
            .collect();

        assert_eq!(claims.len(), 1);
        let (_, roles) = claims.iter().next().unwrap();
        assert_eq!(roles, ["member".to_string(), "admin".to_string()]);
    }

    #[test]
    fn test_team_claimed_under_two_organizations_is_recorded() {
        let payload = ClaimsPayload::new()
            .with_team("developers", "Galaxy", ["member"])
            .with_team("developers", "Nebula", ["member"]);

        assert_eq!(payload.team_organization["developers"], "Galaxy");
        let conflicts: Vec<_> = payload.conflicting_teams().collect();
        assert_eq!(conflicts.len(), 1);
        let (name, owners) = conflicts[0];
        assert_eq!(name, "developers");
        assert!(owners.contains("Galaxy") && owners.contains("Nebula"));
    }

    #[test]
    fn test_repeated_team_under_same_organization_merges() {
        let payload = ClaimsPayload::new()
            .with_team("developers", "Galaxy", ["member"])
            .with_team("developers", "Galaxy", ["admin"]);

        assert_eq!(payload.conflicting_teams().count(), 0);
        assert_eq!(payload.team_membership.len(), 1);
    }

    #[test]
    fn test_rejects_non_list_roles() {
        let result = ClaimsPayload::from_json(r#"{"organization_membership": {"Galaxy": "member"}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_as_map() {
        let payload = ClaimsPayload::new().with_organization("Galaxy", ["member"]);
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["organization_membership"]["Galaxy"][0], "member");
    }
}
