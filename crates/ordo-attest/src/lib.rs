//! Release attestations for SLSA policy evaluations.
//!
//! `ordo-attest` turns a granted [`ordo_policy::Evaluation`] into an in-toto
//! v1 statement with a release predicate, and verifies such statements
//! against facts the consumer expects.
//!
//! Creation and verification are both option-driven:
//! - [`CreationOption`]s enrich an attestation, applied in order
//! - [`Check`]s select which optional facts verification examines
//!
//! Signing and transport of the statement are left to the caller.

pub mod annotation;
pub mod creator;
pub mod error;
pub mod statement;
pub mod verifier;

// Re-export primary types for convenience.
pub use annotation::AnnotationValue;
pub use creator::{CreationOption, create};
pub use error::AttestationError;
pub use statement::{Attestation, PolicyReference};
pub use verifier::{AttestationVerifier, Check, coerce_level};
