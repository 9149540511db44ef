//! in-toto v1 release attestation statement.
//!
//! See: <https://github.com/in-toto/attestation/blob/main/spec/v1/statement.md>
//!
//! The statement records the outcome of a release policy evaluation: which
//! artifact (subject) was evaluated, who evaluated it, which policies were
//! used, and the SLSA build level granted.

use std::collections::BTreeMap;
use std::io::Read;

use chrono::{DateTime, Utc};
use ordo_policy::DigestSet;
use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationValue;
use crate::error::AttestationError;

/// The in-toto v1 statement type URI.
pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";
/// The release attestation predicate type URI.
pub const PREDICATE_TYPE: &str = "https://slsa.dev/release_attestation/v1";
/// Property holding the granted SLSA build level.
pub const SLSA_BUILD_LEVEL_PROPERTY: &str = "slsa.dev/build/level";
/// Package annotation holding the deployment environment.
pub const ENVIRONMENT_ANNOTATION: &str = "environment";
/// Package annotation holding the package version.
pub const VERSION_ANNOTATION: &str = "version";

/// A release attestation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attestation {
    /// Always [`STATEMENT_TYPE`] when produced by this crate.
    #[serde(rename = "_type", alias = "type")]
    pub statement_type: String,
    /// The evaluated artifacts.
    #[serde(rename = "subject", alias = "subjects", default)]
    pub subjects: Vec<Subject>,
    /// Always [`PREDICATE_TYPE`] when produced by this crate.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// The release predicate.
    pub predicate: ReleasePredicate,
}

impl Attestation {
    /// Encode the attestation as JSON bytes.
    ///
    /// Maps are ordered, so equal attestations always encode identically.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Internal`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, AttestationError> {
        serde_json::to_vec(self)
            .map_err(|e| AttestationError::Internal(format!("failed to encode attestation: {e}")))
    }

    /// Decode an attestation from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Internal`] if the bytes are not a
    /// well-formed attestation.
    pub fn from_slice(data: &[u8]) -> Result<Self, AttestationError> {
        serde_json::from_slice(data)
            .map_err(|e| AttestationError::Internal(format!("failed to decode attestation: {e}")))
    }

    /// Decode an attestation from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Io`] if reading fails, otherwise as
    /// [`Attestation::from_slice`].
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, AttestationError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_slice(&data)
    }
}

/// An artifact the attestation is about (an in-toto resource descriptor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    /// Artifact identity, when the profile records one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    /// Content digests.
    #[serde(default)]
    pub digest: DigestSet,
    /// Free-form annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, AnnotationValue>>,
}

/// The release predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasePredicate {
    /// Who evaluated the release.
    pub creator: Creator,
    /// When the attestation was created.
    pub creation_time: DateTime<Utc>,
    /// Policies used for the evaluation, by name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<BTreeMap<String, PolicyReference>>,
    /// The released package.
    pub package: PackageDescriptor,
    /// Numeric properties, including [`SLSA_BUILD_LEVEL_PROPERTY`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, serde_json::Value>>,
}

impl ReleasePredicate {
    /// The raw value of a named property.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&serde_json::Value> {
        self.properties.as_ref().and_then(|p| p.get(name))
    }
}

/// Identifies the tool that created the attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    /// Creator identity (e.g. a URI).
    pub id: String,
    /// Creator version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// A pointer to a policy document used for the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReference {
    /// Where the policy document lives.
    pub uri: String,
    /// Content digests of the policy document.
    pub digest: DigestSet,
}

/// The released package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Package identity.
    pub name: String,
    /// Optional annotations such as [`ENVIRONMENT_ANNOTATION`] and
    /// [`VERSION_ANNOTATION`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, AnnotationValue>>,
}

impl PackageDescriptor {
    /// The raw value of a named annotation.
    #[must_use]
    pub fn annotation(&self, key: &str) -> Option<&AnnotationValue> {
        self.annotations.as_ref().and_then(|a| a.get(key))
    }

    /// Set a string annotation, creating the map if needed.
    pub fn set_annotation(&mut self, key: &str, value: impl Into<AnnotationValue>) {
        self.annotations
            .get_or_insert_with(BTreeMap::new)
            .insert(key.to_owned(), value.into());
    }
}
