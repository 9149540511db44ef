//! Attestation verification against expected facts.
//!
//! The statement type, predicate type, subject digests, creator and package
//! are always checked. Everything else is opt-in: each [`Check`] the caller
//! passes is applied in order, and a fact with no check is not examined at
//! all.

use std::io::Read;

use ordo_policy::DigestSet;

use crate::annotation::{match_annotation, match_optional};
use crate::error::AttestationError;
use crate::statement::{
    Attestation, ENVIRONMENT_ANNOTATION, PREDICATE_TYPE, SLSA_BUILD_LEVEL_PROPERTY,
    STATEMENT_TYPE, VERSION_ANNOTATION,
};

/// An optional fact to check.
///
/// String checks with an empty expected value assert the fact is unset
/// (absent or empty).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The creator's version.
    CreatorVersion(String),
    /// The SLSA build level equals this value.
    SlsaBuildLevel(u8),
    /// The SLSA build level is at least this value.
    SlsaBuildLevelAtLeast(u8),
    /// A named policy reference with this URI whose digests contain these.
    Policy {
        /// Reference name.
        name: String,
        /// Exact URI.
        uri: String,
        /// Digests the reference must contain.
        digests: DigestSet,
    },
    /// The package version annotation.
    PackageVersion(String),
    /// The package environment annotation.
    Environment(String),
}

/// Coerce a numeric JSON value to an integer.
///
/// Accepts integers, and floats with no fractional part that fit in `i64`.
/// Levels often arrive as floats after passing through generic numeric
/// encodings.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    reason = "bounds and fraction are checked before the cast"
)]
pub fn coerce_level(value: &serde_json::Value) -> Option<i64> {
    let serde_json::Value::Number(number) = value else {
        return None;
    };
    if let Some(i) = number.as_i64() {
        return Some(i);
    }
    if number.is_u64() {
        return None;
    }
    let f = number.as_f64()?;
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// A decoded attestation ready for verification.
#[derive(Debug, Clone)]
pub struct AttestationVerifier {
    attestation: Attestation,
}

impl AttestationVerifier {
    /// Wrap an already decoded attestation.
    #[must_use]
    pub const fn new(attestation: Attestation) -> Self {
        Self { attestation }
    }

    /// Decode an attestation from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Internal`] for malformed input.
    pub fn from_slice(data: &[u8]) -> Result<Self, AttestationError> {
        Attestation::from_slice(data).map(Self::new)
    }

    /// Decode an attestation from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::Io`] if reading fails and
    /// [`AttestationError::Internal`] for malformed input.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, AttestationError> {
        Attestation::from_reader(reader).map(Self::new)
    }

    /// The decoded attestation.
    #[must_use]
    pub const fn attestation(&self) -> &Attestation {
        &self.attestation
    }

    /// Verify the attestation, stopping at the first violation.
    ///
    /// # Errors
    ///
    /// - [`AttestationError::Mismatch`] when a checked fact disagrees
    /// - [`AttestationError::InvalidField`] when the attestation has no
    ///   subject, a digest set is invalid, `package` is empty, or a checked
    ///   annotation is not a string
    /// - [`AttestationError::InvalidInput`] when `creator_id` is empty
    pub fn verify(
        &self,
        creator_id: &str,
        digests: &DigestSet,
        package: &str,
        checks: &[Check],
    ) -> Result<(), AttestationError> {
        let att = &self.attestation;

        if att.statement_type != STATEMENT_TYPE {
            return Err(AttestationError::Mismatch(format!(
                "statement type: expected `{STATEMENT_TYPE}`, got `{}`",
                att.statement_type
            )));
        }
        if att.predicate_type != PREDICATE_TYPE {
            return Err(AttestationError::Mismatch(format!(
                "predicate type: expected `{PREDICATE_TYPE}`, got `{}`",
                att.predicate_type
            )));
        }

        let Some(subject) = att.subjects.first() else {
            return Err(AttestationError::InvalidField(
                "attestation has no subject".to_owned(),
            ));
        };
        subject.digest.contains(digests)?;

        if creator_id.is_empty() {
            return Err(AttestationError::InvalidInput(
                "expected creator id is empty".to_owned(),
            ));
        }
        if att.predicate.creator.id != creator_id {
            return Err(AttestationError::Mismatch(format!(
                "creator id: expected `{creator_id}`, got `{}`",
                att.predicate.creator.id
            )));
        }

        if package.is_empty() {
            return Err(AttestationError::InvalidField(
                "expected package is empty".to_owned(),
            ));
        }
        if att.predicate.package.name != package {
            return Err(AttestationError::Mismatch(format!(
                "package: expected `{package}`, got `{}`",
                att.predicate.package.name
            )));
        }

        for check in checks {
            self.apply(check)?;
        }
        Ok(())
    }

    fn apply(&self, check: &Check) -> Result<(), AttestationError> {
        let predicate = &self.attestation.predicate;
        match check {
            Check::CreatorVersion(expected) => match_optional(
                predicate.creator.version.as_deref(),
                expected,
                "creator version",
            ),
            Check::SlsaBuildLevel(expected) => {
                let level = self.level()?;
                if level == i64::from(*expected) {
                    Ok(())
                } else {
                    Err(AttestationError::Mismatch(format!(
                        "SLSA build level: expected {expected}, got {level}"
                    )))
                }
            }
            Check::SlsaBuildLevelAtLeast(minimum) => {
                let level = self.level()?;
                if level >= i64::from(*minimum) {
                    Ok(())
                } else {
                    Err(AttestationError::Mismatch(format!(
                        "SLSA build level: expected at least {minimum}, got {level}"
                    )))
                }
            }
            Check::Policy { name, uri, digests } => {
                let reference = predicate
                    .policy
                    .as_ref()
                    .and_then(|p| p.get(name))
                    .ok_or_else(|| {
                        AttestationError::Mismatch(format!("policy `{name}` not present"))
                    })?;
                if &reference.uri != uri {
                    return Err(AttestationError::Mismatch(format!(
                        "policy `{name}` uri: expected `{uri}`, got `{}`",
                        reference.uri
                    )));
                }
                reference
                    .digest
                    .contains(digests)
                    .map_err(|e| AttestationError::Mismatch(format!("policy `{name}`: {e}")))
            }
            Check::PackageVersion(expected) => match_annotation(
                predicate.package.annotation(VERSION_ANNOTATION),
                VERSION_ANNOTATION,
                expected,
            ),
            Check::Environment(expected) => match_annotation(
                predicate.package.annotation(ENVIRONMENT_ANNOTATION),
                ENVIRONMENT_ANNOTATION,
                expected,
            ),
        }
    }

    fn level(&self) -> Result<i64, AttestationError> {
        let properties = self
            .attestation
            .predicate
            .properties
            .as_ref()
            .ok_or_else(|| AttestationError::Mismatch("no properties".to_owned()))?;
        let value = properties.get(SLSA_BUILD_LEVEL_PROPERTY).ok_or_else(|| {
            AttestationError::Mismatch(format!("property `{SLSA_BUILD_LEVEL_PROPERTY}` missing"))
        })?;
        coerce_level(value).ok_or_else(|| {
            AttestationError::Mismatch(format!(
                "property `{SLSA_BUILD_LEVEL_PROPERTY}` is not an integer: {value}"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attestation_json() -> serde_json::Value {
        json!({
            "_type": STATEMENT_TYPE,
            "subject": [{ "uri": "pkg1", "digest": { "sha256": "aa", "sha512": "bb" } }],
            "predicateType": PREDICATE_TYPE,
            "predicate": {
                "creator": { "id": "ordo", "version": "v1" },
                "creationTime": "2025-01-01T00:00:00Z",
                "policy": {
                    "org": { "uri": "file:///org.json", "digest": { "sha256": "cc" } }
                },
                "package": {
                    "name": "pkg1",
                    "annotations": { "environment": "prod" }
                },
                "properties": { "slsa.dev/build/level": 3 }
            }
        })
    }

    fn verifier(value: &serde_json::Value) -> AttestationVerifier {
        AttestationVerifier::from_slice(&serde_json::to_vec(value).expect("json"))
            .expect("decode")
    }

    fn digests(s: &str) -> DigestSet {
        s.parse().expect("digest")
    }

    fn verify(v: &AttestationVerifier, checks: &[Check]) -> Result<(), AttestationError> {
        v.verify("ordo", &digests("sha256:aa"), "pkg1", checks)
    }

    #[test]
    fn passes_with_no_checks() {
        verify(&verifier(&attestation_json()), &[]).expect("verify");
    }

    #[test]
    fn statement_and_predicate_types_must_match() {
        let mut value = attestation_json();
        value["_type"] = json!("https://in-toto.io/Statement/v0.1");
        assert!(matches!(
            verify(&verifier(&value), &[]),
            Err(AttestationError::Mismatch(_))
        ));

        let mut value = attestation_json();
        value["predicateType"] = json!("https://slsa.dev/provenance/v1");
        assert!(matches!(
            verify(&verifier(&value), &[]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn no_subject_is_invalid_field() {
        let mut value = attestation_json();
        value["subject"] = json!([]);
        assert!(matches!(
            verify(&verifier(&value), &[]),
            Err(AttestationError::InvalidField(_))
        ));
    }

    #[test]
    fn digests_use_subset_semantics() {
        let v = verifier(&attestation_json());
        v.verify("ordo", &digests("sha256:aa,sha512:bb"), "pkg1", &[])
            .expect("full set");
        v.verify("ordo", &digests("sha512:bb"), "pkg1", &[])
            .expect("subset");
        assert!(matches!(
            v.verify("ordo", &digests("sha256:ff"), "pkg1", &[]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            v.verify("ordo", &digests("md5:aa"), "pkg1", &[]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            v.verify("ordo", &DigestSet::default(), "pkg1", &[]),
            Err(AttestationError::InvalidField(_))
        ));
    }

    #[test]
    fn creator_and_package_are_always_checked() {
        let v = verifier(&attestation_json());
        let d = digests("sha256:aa");
        assert!(matches!(
            v.verify("", &d, "pkg1", &[]),
            Err(AttestationError::InvalidInput(_))
        ));
        assert!(matches!(
            v.verify("other", &d, "pkg1", &[]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            v.verify("ordo", &d, "", &[]),
            Err(AttestationError::InvalidField(_))
        ));
        assert!(matches!(
            v.verify("ordo", &d, "pkg2", &[]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn level_checks() {
        let v = verifier(&attestation_json());
        verify(&v, &[Check::SlsaBuildLevel(3)]).expect("exact");
        verify(&v, &[Check::SlsaBuildLevelAtLeast(2)]).expect("at least 2");
        verify(&v, &[Check::SlsaBuildLevelAtLeast(3)]).expect("at least 3");
        assert!(matches!(
            verify(&v, &[Check::SlsaBuildLevel(2)]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            verify(&v, &[Check::SlsaBuildLevelAtLeast(4)]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn level_tolerates_float_encoding() {
        let mut value = attestation_json();
        value["predicate"]["properties"]["slsa.dev/build/level"] = json!(3.0);
        verify(&verifier(&value), &[Check::SlsaBuildLevel(3)]).expect("3.0 == 3");

        value["predicate"]["properties"]["slsa.dev/build/level"] = json!(2.5);
        assert!(matches!(
            verify(&verifier(&value), &[Check::SlsaBuildLevel(2)]),
            Err(AttestationError::Mismatch(_))
        ));

        value["predicate"]["properties"]["slsa.dev/build/level"] = json!("3");
        assert!(matches!(
            verify(&verifier(&value), &[Check::SlsaBuildLevel(3)]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn missing_level_fails_only_when_checked() {
        let mut value = attestation_json();
        value["predicate"]
            .as_object_mut()
            .expect("object")
            .remove("properties");
        let v = verifier(&value);
        verify(&v, &[]).expect("unchecked");
        assert!(matches!(
            verify(&v, &[Check::SlsaBuildLevel(3)]),
            Err(AttestationError::Mismatch(_))
        ));

        let mut value = attestation_json();
        value["predicate"]["properties"] = json!({ "other": 1 });
        assert!(matches!(
            verify(&verifier(&value), &[Check::SlsaBuildLevelAtLeast(0)]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn policy_check() {
        let v = verifier(&attestation_json());
        let check = |name: &str, uri: &str, d: &str| Check::Policy {
            name: name.to_owned(),
            uri: uri.to_owned(),
            digests: digests(d),
        };
        verify(&v, &[check("org", "file:///org.json", "sha256:cc")]).expect("match");
        for bad in [
            check("project", "file:///org.json", "sha256:cc"),
            check("org", "file:///other.json", "sha256:cc"),
            check("org", "file:///org.json", "sha256:dd"),
        ] {
            assert!(matches!(
                verify(&v, &[bad]),
                Err(AttestationError::Mismatch(_))
            ));
        }
    }

    #[test]
    fn policy_digests_use_subset_semantics() {
        let mut value = attestation_json();
        value["predicate"]["policy"]["org"]["digest"] = json!({ "sha256": "cc", "sha512": "dd" });
        let v = verifier(&value);
        let check = |d: &str| Check::Policy {
            name: "org".to_owned(),
            uri: "file:///org.json".to_owned(),
            digests: digests(d),
        };
        verify(&v, &[check("sha512:dd")]).expect("subset of the recorded digests");
        verify(&v, &[check("sha256:cc,sha512:dd")]).expect("full set");
        assert!(matches!(
            verify(&v, &[check("sha256:cc,sha384:ee")]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn empty_subject_digest_is_invalid_field() {
        let mut value = attestation_json();
        value["subject"][0]["digest"] = json!({});
        assert!(matches!(
            verify(&verifier(&value), &[]),
            Err(AttestationError::InvalidField(_))
        ));
    }

    #[test]
    fn annotation_checks() {
        let v = verifier(&attestation_json());
        verify(&v, &[Check::Environment("prod".to_owned())]).expect("env");
        verify(&v, &[Check::PackageVersion(String::new())]).expect("no version");
        assert!(matches!(
            verify(&v, &[Check::Environment(String::new())]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            verify(&v, &[Check::PackageVersion("1.0".to_owned())]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn creator_version_check() {
        let v = verifier(&attestation_json());
        verify(&v, &[Check::CreatorVersion("v1".to_owned())]).expect("version");
        assert!(matches!(
            verify(&v, &[Check::CreatorVersion("v2".to_owned())]),
            Err(AttestationError::Mismatch(_))
        ));
        assert!(matches!(
            verify(&v, &[Check::CreatorVersion(String::new())]),
            Err(AttestationError::Mismatch(_))
        ));
    }

    #[test]
    fn first_failing_check_is_reported() {
        let v = verifier(&attestation_json());
        let result = verify(
            &v,
            &[
                Check::SlsaBuildLevel(2),
                Check::Environment("dev".to_owned()),
            ],
        );
        let Err(AttestationError::Mismatch(message)) = result else {
            panic!("expected mismatch");
        };
        assert!(message.contains("SLSA build level"), "{message}");
    }

    #[test]
    fn coerce_level_cases() {
        assert_eq!(coerce_level(&json!(3)), Some(3));
        assert_eq!(coerce_level(&json!(3.0)), Some(3));
        assert_eq!(coerce_level(&json!(-1.0)), Some(-1));
        assert_eq!(coerce_level(&json!(3.5)), None);
        assert_eq!(coerce_level(&json!(u64::MAX)), None);
        assert_eq!(coerce_level(&json!(1e300)), None);
        assert_eq!(coerce_level(&json!("3")), None);
        assert_eq!(coerce_level(&json!(null)), None);
    }
}
