//! Project policies and the per-package policy index.
//!
//! A project policy declares which build root (by human name) and which
//! source repository a package's releases must come from, optionally scoped
//! to a set of deployment environments.
//!
//! ```json
//! {
//!   "format": 1,
//!   "package": {
//!     "identity": "docker.io/org/echo-server",
//!     "environment": { "anyOf": ["dev", "prod"] }
//!   },
//!   "build": {
//!     "requireSlsaBuilder": "github_actions_level_3",
//!     "repository": { "uri": "github.com/org/echo-server" }
//!   }
//! }
//! ```

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use serde::Deserialize;
use tracing::debug;

use crate::SUPPORTED_FORMAT;
use crate::error::PolicyError;
use crate::organization::OrganizationPolicy;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectDocument {
    format: u32,
    package: PackageDocument,
    build: ProjectBuildDocument,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PackageDocument {
    #[serde(alias = "name")]
    identity: String,
    environment: Option<EnvironmentDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EnvironmentDocument {
    any_of: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectBuildDocument {
    require_slsa_builder: Option<String>,
    repository: Option<RepositoryDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RepositoryDocument {
    uri: String,
}

/// A validated project policy for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPolicy {
    /// Identity of the released package (URI or name).
    pub package: String,
    /// Allowed environment labels; `None` means the policy is not scoped.
    pub environments: Option<BTreeSet<String>>,
    /// Human name of the build root releases must be built on.
    pub builder: String,
    /// Identity of the source repository releases must be built from.
    pub repository: String,
}

impl ProjectPolicy {
    /// Parse and validate a project policy from a reader.
    ///
    /// # Errors
    ///
    /// See [`ProjectPolicy::from_slice`]; reader failures are
    /// [`PolicyError::Io`].
    pub fn from_reader<R: Read>(
        mut reader: R,
        known_builders: &BTreeSet<String>,
    ) -> Result<Self, PolicyError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_slice(&data, known_builders)
    }

    /// Parse and validate a project policy from bytes.
    ///
    /// `known_builders` are the root names registered by the organization;
    /// the policy's builder must be one of them.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidInput`] if `known_builders` is empty and
    /// [`PolicyError::InvalidField`] for any invalid content.
    pub fn from_slice(data: &[u8], known_builders: &BTreeSet<String>) -> Result<Self, PolicyError> {
        if known_builders.is_empty() {
            return Err(PolicyError::InvalidInput(
                "no known builders: load the organization policy first".to_owned(),
            ));
        }

        let doc: ProjectDocument = serde_json::from_slice(data).map_err(|e| {
            PolicyError::InvalidField(format!("failed to parse project policy: {e}"))
        })?;

        if doc.format != SUPPORTED_FORMAT {
            return Err(PolicyError::InvalidField(format!(
                "project policy format {} is not supported (expected {SUPPORTED_FORMAT})",
                doc.format
            )));
        }

        let package = doc.package.identity;
        if package.is_empty() {
            return Err(PolicyError::InvalidField(
                "package.identity is empty".to_owned(),
            ));
        }

        let environments = doc
            .package
            .environment
            .map(|env| validate_environments(&package, env.any_of))
            .transpose()?;

        let builder = doc
            .build
            .require_slsa_builder
            .filter(|b| !b.is_empty())
            .ok_or_else(|| {
                PolicyError::InvalidField(format!(
                    "build.requireSlsaBuilder is missing for `{package}`"
                ))
            })?;
        if !known_builders.contains(&builder) {
            return Err(PolicyError::InvalidField(format!(
                "builder `{builder}` required by `{package}` is not registered by the organization"
            )));
        }

        let repository = doc
            .build
            .repository
            .map(|r| r.uri)
            .filter(|uri| !uri.is_empty())
            .ok_or_else(|| {
                PolicyError::InvalidField(format!(
                    "build.repository.uri is missing for `{package}`"
                ))
            })?;

        Ok(Self {
            package,
            environments,
            builder,
            repository,
        })
    }
}

fn validate_environments(
    package: &str,
    labels: Vec<String>,
) -> Result<BTreeSet<String>, PolicyError> {
    if labels.is_empty() {
        return Err(PolicyError::InvalidField(format!(
            "package.environment.anyOf is empty for `{package}`"
        )));
    }
    if labels.iter().any(String::is_empty) {
        return Err(PolicyError::InvalidField(format!(
            "package.environment.anyOf has an empty label for `{package}`"
        )));
    }
    Ok(labels.into_iter().collect())
}

/// Policies registered for one package identity.
#[derive(Debug, Clone)]
pub enum PackagePolicies {
    /// A single policy with no environment scoping.
    Unscoped(ProjectPolicy),
    /// One or more environment-scoped policies, indexed by label.
    Scoped(BTreeMap<String, ProjectPolicy>),
}

impl PackagePolicies {
    /// Resolve the policy for an optional environment label.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidInput`] when an environment is supplied
    /// to an unscoped package or omitted for a scoped one, and
    /// [`PolicyError::NotFound`] when the label is not declared.
    pub fn resolve(&self, environment: Option<&str>) -> Result<&ProjectPolicy, PolicyError> {
        match (self, environment) {
            (Self::Unscoped(policy), None) => Ok(policy),
            (Self::Unscoped(policy), Some(env)) => Err(PolicyError::InvalidInput(format!(
                "environment `{env}` supplied but the policy for `{}` declares none",
                policy.package
            ))),
            (Self::Scoped(by_env), None) => Err(PolicyError::InvalidInput(format!(
                "no environment supplied but the policy declares {:?}",
                by_env.keys().collect::<Vec<_>>()
            ))),
            (Self::Scoped(by_env), Some(env)) => by_env.get(env).ok_or_else(|| {
                PolicyError::NotFound(format!(
                    "environment `{env}` is not in {:?}",
                    by_env.keys().collect::<Vec<_>>()
                ))
            }),
        }
    }
}

/// Every project policy, indexed by package identity and environment.
///
/// Keys are unique over `(package, environment)`: a package is either
/// unscoped exactly once, or scoped by one or more policies with disjoint
/// labels.
#[derive(Debug, Clone, Default)]
pub struct ProjectPolicySet {
    packages: BTreeMap<String, PackagePolicies>,
}

impl ProjectPolicySet {
    /// Load every project policy and index it.
    ///
    /// Each document is validated against the organization's registered
    /// builder names.
    ///
    /// # Errors
    ///
    /// Returns the first error from [`ProjectPolicy::from_reader`], or
    /// [`PolicyError::InvalidField`] on the first key collision.
    pub fn from_readers<I, R>(readers: I, organization: &OrganizationPolicy) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = R>,
        R: Read,
    {
        let known_builders = organization.builder_names();
        let mut set = Self::default();
        for reader in readers {
            let policy = ProjectPolicy::from_reader(reader, &known_builders)?;
            set.insert(policy)?;
        }
        debug!(packages = set.len(), "loaded project policies");
        Ok(set)
    }

    /// Add a policy, rejecting key collisions.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidField`] if the package is already
    /// registered without scoping, is registered with scoping and this
    /// policy has none (or vice versa), or an environment label overlaps.
    pub fn insert(&mut self, policy: ProjectPolicy) -> Result<(), PolicyError> {
        let entry = match self.packages.entry(policy.package.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Self::new_entry(policy));
                return Ok(());
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        match (entry, &policy.environments) {
            (PackagePolicies::Unscoped(_), None) => Err(PolicyError::InvalidField(format!(
                "package `{}` has more than one policy",
                policy.package
            ))),
            (PackagePolicies::Unscoped(_), Some(_)) | (PackagePolicies::Scoped(_), None) => {
                Err(PolicyError::InvalidField(format!(
                    "package `{}` has policies both with and without environment scoping",
                    policy.package
                )))
            }
            (PackagePolicies::Scoped(by_env), Some(labels)) => {
                if let Some(overlap) = labels.iter().find(|l| by_env.contains_key(*l)) {
                    return Err(PolicyError::InvalidField(format!(
                        "package `{}` has more than one policy for environment `{overlap}`",
                        policy.package
                    )));
                }
                for label in labels {
                    by_env.insert(label.clone(), policy.clone());
                }
                Ok(())
            }
        }
    }

    fn new_entry(policy: ProjectPolicy) -> PackagePolicies {
        match &policy.environments {
            None => PackagePolicies::Unscoped(policy),
            Some(labels) => PackagePolicies::Scoped(
                labels
                    .iter()
                    .map(|label| (label.clone(), policy.clone()))
                    .collect(),
            ),
        }
    }

    /// Policies registered for `package`.
    #[must_use]
    pub fn get(&self, package: &str) -> Option<&PackagePolicies> {
        self.packages.get(package)
    }

    /// Registered package identities, in sorted order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Number of distinct package identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether no policies are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}
