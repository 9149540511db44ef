//! Release policy evaluation.
//!
//! [`ReleasePolicy`] composes the organization policy with the project
//! policy set. Evaluating a release resolves the package's project policy,
//! checks the environment, asks a [`BuildVerifier`] whether the artifact was
//! built by the required root from the required repository, and returns the
//! level the root grants.

use std::io::Read;

use tracing::{debug, warn};

use crate::digest::DigestSet;
use crate::error::PolicyError;
use crate::level::SlsaLevel;
use crate::organization::OrganizationPolicy;
use crate::project::ProjectPolicySet;

/// Boxed error returned by a [`BuildVerifier`].
pub type BuildVerifierError = Box<dyn std::error::Error + Send + Sync>;

/// Verifies that an artifact was built by a given platform from a given
/// source repository, typically by checking the artifact's build provenance.
///
/// Evaluation treats any error as a terminal verification failure and never
/// retries.
pub trait BuildVerifier {
    /// Verify the build of `package` with content `digests`.
    ///
    /// # Errors
    ///
    /// Any error means the build claim was rejected.
    fn verify_build(
        &self,
        digests: &DigestSet,
        package: &str,
        builder_id: &str,
        source_uri: &str,
    ) -> Result<(), BuildVerifierError>;
}

impl<F> BuildVerifier for F
where
    F: Fn(&DigestSet, &str, &str, &str) -> Result<(), BuildVerifierError>,
{
    fn verify_build(
        &self,
        digests: &DigestSet,
        package: &str,
        builder_id: &str,
        source_uri: &str,
    ) -> Result<(), BuildVerifierError> {
        self(digests, package, builder_id, source_uri)
    }
}

/// Outcome of a successful evaluation.
///
/// Consumed once to create an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The evaluated package identity.
    pub package: String,
    /// Content digests of the evaluated artifact.
    pub digests: DigestSet,
    /// Environment the release was evaluated for.
    pub environment: Option<String>,
    /// Level granted by the matched root; `None` if it could not be
    /// determined.
    pub level: Option<SlsaLevel>,
}

impl Evaluation {
    /// Whether this evaluation grants a level and identifies a valid artifact.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.level.is_some() && !self.package.is_empty() && self.digests.validate().is_ok()
    }
}

/// Organization and project policies, ready for evaluation.
///
/// Read-only once constructed; evaluations share no mutable state and may
/// run concurrently.
#[derive(Debug, Clone)]
pub struct ReleasePolicy {
    organization: OrganizationPolicy,
    projects: ProjectPolicySet,
}

impl ReleasePolicy {
    /// Combine already-loaded policies.
    #[must_use]
    pub const fn new(organization: OrganizationPolicy, projects: ProjectPolicySet) -> Self {
        Self {
            organization,
            projects,
        }
    }

    /// Load the organization policy, then every project policy against it.
    ///
    /// # Errors
    ///
    /// Returns the first loading error; no partial policy is returned.
    pub fn from_readers<O, I, R>(organization: O, projects: I) -> Result<Self, PolicyError>
    where
        O: Read,
        I: IntoIterator<Item = R>,
        R: Read,
    {
        let organization = OrganizationPolicy::from_reader(organization)?;
        let projects = ProjectPolicySet::from_readers(projects, &organization)?;
        Ok(Self::new(organization, projects))
    }

    /// The organization policy.
    #[must_use]
    pub const fn organization(&self) -> &OrganizationPolicy {
        &self.organization
    }

    /// The project policy set.
    #[must_use]
    pub const fn projects(&self) -> &ProjectPolicySet {
        &self.projects
    }

    /// Evaluate a release of `package` with content `digests`.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::InvalidInput`] for an empty package, or an
    ///   environment supplied to (or omitted from) a package whose policy
    ///   does not (or does) declare environments
    /// - [`PolicyError::InvalidField`] for an invalid digest set
    /// - [`PolicyError::NotFound`] for an unknown package or an undeclared
    ///   environment
    /// - [`PolicyError::Verification`] if the build verifier rejects the
    ///   release
    pub fn evaluate(
        &self,
        digests: &DigestSet,
        package: &str,
        environment: Option<&str>,
        verifier: &dyn BuildVerifier,
    ) -> Result<Evaluation, PolicyError> {
        if package.is_empty() {
            return Err(PolicyError::InvalidInput("package is empty".to_owned()));
        }
        digests.validate()?;

        let policies = self
            .projects
            .get(package)
            .ok_or_else(|| PolicyError::NotFound(format!("no policy for package `{package}`")))?;
        let policy = policies.resolve(environment)?;

        let builder_id = self.organization.builder_id(&policy.builder).ok_or_else(|| {
            PolicyError::Internal(format!(
                "builder `{}` passed validation but is not registered",
                policy.builder
            ))
        })?;

        debug!(
            package,
            environment,
            builder = %policy.builder,
            builder_id,
            repository = %policy.repository,
            "verifying build"
        );

        verifier
            .verify_build(digests, package, builder_id, &policy.repository)
            .map_err(|source| PolicyError::Verification {
                package: package.to_owned(),
                source,
            })?;

        let level = self.organization.slsa_level(&policy.builder);
        if level.is_none() {
            warn!(builder = %policy.builder, "no SLSA level registered for builder");
        }

        Ok(Evaluation {
            package: package.to_owned(),
            digests: digests.clone(),
            environment: environment.map(str::to_owned),
            level,
        })
    }
}
