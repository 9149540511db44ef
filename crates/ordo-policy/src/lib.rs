//! Release policies for SLSA build levels.
//!
//! `ordo-policy` decides which SLSA build level a package release is
//! entitled to. Two tiers of policy feed the decision:
//! 1. **Organization** — the trusted build roots and the level each grants
//! 2. **Project** — per package, the root and source repository releases
//!    must come from, optionally scoped to deployment environments
//!
//! Evaluation delegates the actual build check to a [`BuildVerifier`].

pub mod digest;
pub mod error;
pub mod evaluate;
pub mod level;
pub mod organization;
pub mod project;

/// The only policy document format version understood by this crate.
pub const SUPPORTED_FORMAT: u32 = 1;

// Re-export primary types for convenience.
pub use digest::DigestSet;
pub use error::PolicyError;
pub use evaluate::{BuildVerifier, BuildVerifierError, Evaluation, ReleasePolicy};
pub use level::SlsaLevel;
pub use organization::{BuildRoot, OrganizationPolicy};
pub use project::{PackagePolicies, ProjectPolicy, ProjectPolicySet};
