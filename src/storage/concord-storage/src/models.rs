//! Entity types shared by every repository implementation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier assigned to an organization by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub i64);

/// Identifier assigned to a team by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TeamId(pub i64);

/// Identifier of an already-resolved local user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "org:{}", self.0)
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team:{}", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An organization. Its name is unique and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Persistence id.
    pub id: OrganizationId,
    /// Unique name.
    pub name: String,
}

/// A team, owned by exactly one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Persistence id.
    pub id: TeamId,
    /// Name, unique within the owning organization.
    pub name: String,
    /// Owning organization, fixed at creation.
    pub organization_id: OrganizationId,
}

/// Outcome of a get-or-create: the entity id, and whether this call
/// inserted it.
///
/// `created` is `false` when the entity already existed, including when a
/// concurrent caller inserted it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ensured<T> {
    /// Id of the entity.
    pub id: T,
    /// Whether this call inserted the entity.
    pub created: bool,
}

impl<T> Ensured<T> {
    /// An entity inserted by this call.
    pub fn created(id: T) -> Self {
        Self { id, created: true }
    }

    /// An entity that already existed.
    pub fn existing(id: T) -> Self {
        Self { id, created: false }
    }
}

/// The entity a membership role is granted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MembershipTarget {
    /// Organization-level membership.
    Organization(OrganizationId),
    /// Team-level membership.
    Team(TeamId),
}

impl MembershipTarget {
    /// Short label for the target kind, used in storage and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Organization(_) => "organization",
            Self::Team(_) => "team",
        }
    }

    /// Raw persistence id of the target.
    pub fn raw_id(&self) -> i64 {
        match self {
            Self::Organization(id) => id.0,
            Self::Team(id) => id.0,
        }
    }
}

impl fmt::Display for MembershipTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Organization(id) => id.fmt(f),
            Self::Team(id) => id.fmt(f),
        }
    }
}

/// A role held by a user on an organization or team.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    /// Grantee.
    pub user: UserId,
    /// Organization or team.
    pub target: MembershipTarget,
    /// Role name (e.g. "member", "admin").
    pub role: String,
}
