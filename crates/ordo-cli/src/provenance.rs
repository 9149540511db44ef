//! Build verification against an SLSA provenance statement on disk.
//!
//! Checks an unsigned in-toto statement carrying an SLSA provenance
//! predicate (v1, or v0.2 for the builder and source fields). Signature
//! checking is the job of whatever fetched the statement.
//!
//! See: <https://slsa.dev/spec/v1.0/provenance>

use std::path::PathBuf;

use ordo_policy::{BuildVerifier, BuildVerifierError, DigestSet};
use serde_json::Value;

/// Prefix shared by SLSA provenance predicate types.
const PROVENANCE_PREDICATE_PREFIX: &str = "https://slsa.dev/provenance/";

/// Verifies builds using a provenance statement read from a file.
#[derive(Debug, Clone)]
pub(crate) struct ProvenanceFileVerifier {
    path: PathBuf,
}

impl ProvenanceFileVerifier {
    pub(crate) const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Value, BuildVerifierError> {
        let data = std::fs::read(&self.path).map_err(|e| {
            format!("failed to read provenance `{}`: {e}", self.path.display())
        })?;
        Ok(serde_json::from_slice(&data).map_err(|e| {
            format!("failed to parse provenance `{}`: {e}", self.path.display())
        })?)
    }
}

impl BuildVerifier for ProvenanceFileVerifier {
    fn verify_build(
        &self,
        digests: &DigestSet,
        package: &str,
        builder_id: &str,
        source_uri: &str,
    ) -> Result<(), BuildVerifierError> {
        let statement = self.load()?;
        tracing::debug!(path = %self.path.display(), package, "checking provenance");

        let predicate_type = statement
            .get("predicateType")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !predicate_type.starts_with(PROVENANCE_PREDICATE_PREFIX) {
            return Err(format!("not an SLSA provenance statement: `{predicate_type}`").into());
        }

        check_subjects(&statement, digests)?;

        let predicate = statement.get("predicate");
        let actual_builder = predicate
            .and_then(|p| p.pointer("/runDetails/builder/id").or_else(|| p.pointer("/builder/id")))
            .and_then(Value::as_str)
            .ok_or("provenance has no builder id")?;
        if actual_builder != builder_id {
            return Err(format!(
                "builder mismatch: expected `{builder_id}`, provenance has `{actual_builder}`"
            )
            .into());
        }

        let source = predicate
            .and_then(build_source)
            .ok_or("provenance names no source repository")?;
        if normalize_repository(&source) != normalize_repository(source_uri) {
            return Err(format!(
                "source mismatch: expected `{source_uri}`, provenance has `{source}`"
            )
            .into());
        }

        Ok(())
    }
}

/// At least one subject's digests must contain `digests`.
fn check_subjects(statement: &Value, digests: &DigestSet) -> Result<(), BuildVerifierError> {
    let subjects = statement
        .get("subject")
        .and_then(Value::as_array)
        .ok_or("provenance has no subjects")?;

    let matched = subjects.iter().any(|subject| {
        subject
            .get("digest")
            .and_then(|d| serde_json::from_value::<DigestSet>(d.clone()).ok())
            .is_some_and(|actual| actual.contains(digests).is_ok())
    });
    if matched {
        Ok(())
    } else {
        Err(format!("no provenance subject matches digests {digests}").into())
    }
}

/// The repository the build ran from.
///
/// The declared source wins: `externalParameters.source`, then
/// `externalParameters.workflow.repository`, then v0.2
/// `invocation.configSource.uri`. Only when none is present does the first
/// resolved dependency stand in for it; later dependencies are inputs, not
/// the source.
fn build_source(predicate: &Value) -> Option<String> {
    let external = predicate.pointer("/buildDefinition/externalParameters");
    let declared = ["/source", "/workflow/repository"]
        .into_iter()
        .find_map(|pointer| external.and_then(|e| e.pointer(pointer)).and_then(uri_of))
        .or_else(|| {
            predicate
                .pointer("/invocation/configSource/uri")
                .and_then(Value::as_str)
        });

    declared
        .or_else(|| {
            predicate
                .pointer("/buildDefinition/resolvedDependencies/0/uri")
                .and_then(Value::as_str)
        })
        .map(str::to_owned)
}

/// A string, or an object's `uri` field.
fn uri_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => map.get("uri").and_then(Value::as_str),
        _ => None,
    }
}

/// Reduce a repository URI to `host/path` so that
/// `git+https://github.com/org/repo@refs/heads/main`,
/// `git+ssh://git@github.com/org/repo.git` and `git@github.com:org/repo`
/// all match `github.com/org/repo`.
fn normalize_repository(uri: &str) -> String {
    let uri = uri.strip_prefix("git+").unwrap_or(uri);
    let uri = uri.split_once("://").map_or(uri, |(_, rest)| rest);

    let normalized = match uri.split_once('/') {
        Some((authority, path)) => {
            // userinfo, then scp-style `host:org`
            let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
            let host = host.replacen(':', "/", 1);
            let path = path.split_once('@').map_or(path, |(path, _)| path);
            format!("{host}/{path}")
        }
        None => uri.split_once('@').map_or(uri, |(repo, _)| repo).to_owned(),
    };
    match normalized.strip_suffix(".git") {
        Some(trimmed) => trimmed.to_owned(),
        None => normalized,
    }
}
