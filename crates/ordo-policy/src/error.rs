//! Error types for policy loading and evaluation.

/// Errors from the Ordo policy subsystem.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A policy document or structure is malformed or missing a required field.
    #[error("invalid field: {0}")]
    InvalidField(String),

    /// A caller-supplied argument is wrong.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A lookup failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// Two values that should agree do not.
    #[error("mismatch: {0}")]
    Mismatch(String),

    /// The build verifier rejected the release.
    #[error("build verification failed for `{package}`: {source}")]
    Verification {
        /// The package whose build was checked.
        package: String,
        /// The error reported by the build verifier.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An invariant inside this crate was violated.
    #[error("internal error: {0}")]
    Internal(String),

    /// Reading a policy stream failed.
    #[error("policy I/O error: {0}")]
    Io(#[from] std::io::Error),
}
