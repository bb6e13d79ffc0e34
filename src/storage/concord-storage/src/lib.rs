//! # Concord Storage
//!
//! Repository abstraction for the entities Concord reconciles.
//!
//! Provides the [`MembershipRepository`] trait, the shared entity types and
//! an in-memory implementation suitable for tests and dev mode.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod memory;
pub mod models;

pub use backend::MembershipRepository;
pub use error::RepositoryError;
pub use memory::{MemoryRepository, RepositoryCall};
pub use models::{
    Ensured, Grant, MembershipTarget, Organization, OrganizationId, Team, TeamId, UserId,
};
