//! # Concord Claims
//!
//! Reconciles a user's organization and team memberships against the claims
//! an identity provider asserted at login.
//!
//! ## Flow
//!
//! 1. [`resolve`] turns a [`ClaimsPayload`] into the organizations and teams
//!    that must exist, plus the roles to grant on each.
//! 2. [`Reconciler`] loads what already exists, creates what is missing
//!    (organizations first, then teams) and applies the grants.
//! 3. [`ClaimsProcessor`] is the single entry point login flows call.
//!
//! Every step is get-or-create or idempotent, so replaying the same claims
//! leaves the store unchanged and an interrupted pass resumes on retry.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod payload;
pub mod processor;
pub mod reconciler;
pub mod resolver;

pub use error::ClaimsError;
pub use payload::{ClaimsPayload, RoleClaims};
pub use processor::ClaimsProcessor;
pub use reconciler::{ReconcileReport, Reconciler, ResolvedIds};
pub use resolver::{resolve, ResolvedMemberships};
