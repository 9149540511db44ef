//! Error types for the attestation subsystem.

use ordo_policy::PolicyError;

/// Errors from the Ordo attestation subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AttestationError {
    /// The attestation or a value inside it is malformed.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A caller-supplied argument is wrong.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A value in the attestation disagrees with the expected value.
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// An invariant was violated, or the attestation could not be encoded
    /// or decoded.
    #[error("internal error: {0}")]
    Internal(String),

    /// Reading an attestation stream failed.
    #[error("attestation I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<PolicyError> for AttestationError {
    fn from(err: PolicyError) -> Self {
        match err {
            PolicyError::InvalidField(m) => Self::InvalidField(m),
            PolicyError::InvalidInput(m) => Self::InvalidInput(m),
            PolicyError::Mismatch(m) => Self::Mismatch(m),
            PolicyError::Io(e) => Self::Io(e),
            other @ (PolicyError::NotFound(_)
            | PolicyError::Verification { .. }
            | PolicyError::Internal(_)) => Self::Internal(other.to_string()),
        }
    }
}
