//! Attestation creation from a policy evaluation.
//!
//! [`create`] builds the attestation skeleton from an [`Evaluation`] and then
//! applies [`CreationOption`]s strictly in the order given. Each option may
//! fail independently. [`CreationOption::SafeMode`] locks the SLSA level:
//! any later [`CreationOption::SlsaLevel`] fails.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ordo_policy::{Evaluation, SlsaLevel};
use tracing::debug;

use crate::error::AttestationError;
use crate::statement::{
    Attestation, Creator, ENVIRONMENT_ANNOTATION, PREDICATE_TYPE, PackageDescriptor,
    PolicyReference, ReleasePredicate, SLSA_BUILD_LEVEL_PROPERTY, STATEMENT_TYPE, Subject,
    VERSION_ANNOTATION,
};

/// An optional enrichment applied while creating an attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationOption {
    /// Record the creator's version.
    CreatorVersion(String),
    /// Annotate the package with its version.
    PackageVersion(String),
    /// Reference the policies used for the evaluation, by name. Merged with
    /// references added by earlier options.
    Policy(BTreeMap<String, PolicyReference>),
    /// Override the SLSA level. Must be in `0..=4`.
    SlsaLevel(i64),
    /// Forbid any later level override.
    SafeMode,
    /// Use a fixed creation time instead of the current time.
    CreationTime(DateTime<Utc>),
}

/// Builds one attestation, tracking whether safe mode is on.
struct AttestationBuilder {
    attestation: Attestation,
    safe_mode: bool,
}

impl AttestationBuilder {
    fn new(evaluation: &Evaluation, creator_id: &str) -> Result<Self, AttestationError> {
        if !evaluation.is_granted() {
            return Err(AttestationError::Internal(format!(
                "cannot create an attestation for `{}`: evaluation did not grant a level",
                evaluation.package
            )));
        }
        let Some(level) = evaluation.level else {
            return Err(AttestationError::Internal(
                "granted evaluation has no level".to_owned(),
            ));
        };
        if creator_id.is_empty() {
            return Err(AttestationError::InvalidInput(
                "creator id is empty".to_owned(),
            ));
        }

        let mut package = PackageDescriptor {
            name: evaluation.package.clone(),
            annotations: None,
        };
        if let Some(env) = &evaluation.environment {
            package.set_annotation(ENVIRONMENT_ANNOTATION, env.as_str());
        }

        let attestation = Attestation {
            statement_type: STATEMENT_TYPE.to_owned(),
            subjects: vec![Subject {
                uri: Some(evaluation.package.clone()),
                digest: evaluation.digests.clone(),
                annotations: None,
            }],
            predicate_type: PREDICATE_TYPE.to_owned(),
            predicate: ReleasePredicate {
                creator: Creator {
                    id: creator_id.to_owned(),
                    version: None,
                },
                creation_time: Utc::now(),
                policy: None,
                package,
                properties: Some(BTreeMap::from([(
                    SLSA_BUILD_LEVEL_PROPERTY.to_owned(),
                    serde_json::Value::from(level.get()),
                )])),
            },
        };

        Ok(Self {
            attestation,
            safe_mode: false,
        })
    }

    fn apply(&mut self, option: CreationOption) -> Result<(), AttestationError> {
        let predicate = &mut self.attestation.predicate;
        match option {
            CreationOption::CreatorVersion(version) => predicate.creator.version = Some(version),
            CreationOption::PackageVersion(version) => {
                predicate.package.set_annotation(VERSION_ANNOTATION, version);
            }
            CreationOption::Policy(references) => {
                predicate
                    .policy
                    .get_or_insert_with(BTreeMap::new)
                    .extend(references);
            }
            CreationOption::SlsaLevel(raw) => {
                if self.safe_mode {
                    return Err(AttestationError::Internal(format!(
                        "cannot set SLSA level {raw}: safe mode is on"
                    )));
                }
                let level = SlsaLevel::new(raw).ok_or_else(|| {
                    AttestationError::InvalidInput(format!("SLSA level {raw} is outside 0..=4"))
                })?;
                predicate.properties.get_or_insert_with(BTreeMap::new).insert(
                    SLSA_BUILD_LEVEL_PROPERTY.to_owned(),
                    serde_json::Value::from(level.get()),
                );
            }
            CreationOption::SafeMode => self.safe_mode = true,
            CreationOption::CreationTime(time) => predicate.creation_time = time,
        }
        Ok(())
    }
}

/// Create an attestation for a granted evaluation.
///
/// # Errors
///
/// - [`AttestationError::Internal`] if `evaluation` did not grant a level,
///   or a level override follows [`CreationOption::SafeMode`]
/// - [`AttestationError::InvalidInput`] for an empty `creator_id` or an
///   out-of-range level override
pub fn create(
    evaluation: &Evaluation,
    creator_id: &str,
    options: impl IntoIterator<Item = CreationOption>,
) -> Result<Attestation, AttestationError> {
    let mut builder = AttestationBuilder::new(evaluation, creator_id)?;
    for option in options {
        builder.apply(option)?;
    }
    debug!(
        package = %evaluation.package,
        creator = creator_id,
        "created release attestation"
    );
    Ok(builder.attestation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationValue;
    use ordo_policy::DigestSet;

    fn evaluation(level: Option<i64>, environment: Option<&str>) -> Evaluation {
        Evaluation {
            package: "pkg1".to_owned(),
            digests: "sha256:aa".parse::<DigestSet>().expect("digest"),
            environment: environment.map(str::to_owned),
            level: level.and_then(SlsaLevel::new),
        }
    }

    fn level_of(att: &Attestation) -> Option<&serde_json::Value> {
        att.predicate.property(SLSA_BUILD_LEVEL_PROPERTY)
    }

    #[test]
    fn skeleton_from_evaluation() {
        let att = create(&evaluation(Some(3), Some("prod")), "ordo", []).expect("create");
        assert_eq!(att.statement_type, STATEMENT_TYPE);
        assert_eq!(att.predicate_type, PREDICATE_TYPE);
        assert_eq!(att.subjects.len(), 1);
        assert_eq!(att.subjects[0].uri.as_deref(), Some("pkg1"));
        assert_eq!(att.subjects[0].digest.get("sha256"), Some("aa"));
        assert_eq!(att.predicate.creator.id, "ordo");
        assert_eq!(att.predicate.creator.version, None);
        assert_eq!(att.predicate.package.name, "pkg1");
        assert_eq!(
            att.predicate.package.annotation(ENVIRONMENT_ANNOTATION),
            Some(&AnnotationValue::from("prod"))
        );
        assert_eq!(level_of(&att), Some(&serde_json::json!(3)));
        assert!(att.predicate.policy.is_none());
    }

    #[test]
    fn no_environment_means_no_annotation() {
        let att = create(&evaluation(Some(2), None), "ordo", []).expect("create");
        assert!(att.predicate.package.annotations.is_none());
    }

    #[test]
    fn ungranted_evaluation_is_internal() {
        let result = create(&evaluation(None, None), "ordo", []);
        assert!(matches!(result, Err(AttestationError::Internal(_))));

        let mut bad_digests = evaluation(Some(3), None);
        bad_digests.digests = DigestSet::default();
        assert!(matches!(
            create(&bad_digests, "ordo", []),
            Err(AttestationError::Internal(_))
        ));
    }

    #[test]
    fn empty_creator_is_invalid_input() {
        let result = create(&evaluation(Some(3), None), "", []);
        assert!(matches!(result, Err(AttestationError::InvalidInput(_))));
    }

    #[test]
    fn enrichment_options_apply() {
        let time = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .expect("time")
            .with_timezone(&Utc);
        let att = create(
            &evaluation(Some(3), None),
            "ordo",
            [
                CreationOption::CreatorVersion("v1.2".to_owned()),
                CreationOption::PackageVersion("2.0.0".to_owned()),
                CreationOption::Policy(BTreeMap::from([(
                    "org".to_owned(),
                    PolicyReference {
                        uri: "file:///org.json".to_owned(),
                        digest: "sha256:bb".parse().expect("digest"),
                    },
                )])),
                CreationOption::Policy(BTreeMap::from([(
                    "project".to_owned(),
                    PolicyReference {
                        uri: "file:///pkg1.json".to_owned(),
                        digest: "sha256:cc".parse().expect("digest"),
                    },
                )])),
                CreationOption::CreationTime(time),
            ],
        )
        .expect("create");
        assert_eq!(att.predicate.creator.version.as_deref(), Some("v1.2"));
        assert_eq!(
            att.predicate.package.annotation(VERSION_ANNOTATION),
            Some(&AnnotationValue::from("2.0.0"))
        );
        let policy = att.predicate.policy.as_ref().expect("policy refs");
        assert_eq!(policy.len(), 2);
        assert_eq!(att.predicate.creation_time, time);
    }

    #[test]
    fn level_override_is_range_checked() {
        let att = create(&evaluation(Some(3), None), "ordo", [CreationOption::SlsaLevel(1)])
            .expect("create");
        assert_eq!(level_of(&att), Some(&serde_json::json!(1)));

        for bad in [-1, 5] {
            assert!(matches!(
                create(&evaluation(Some(3), None), "ordo", [CreationOption::SlsaLevel(bad)]),
                Err(AttestationError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn safe_mode_forbids_later_level_changes() {
        let result = create(
            &evaluation(Some(3), None),
            "ordo",
            [CreationOption::SafeMode, CreationOption::SlsaLevel(2)],
        );
        assert!(matches!(result, Err(AttestationError::Internal(_))));

        let att = create(
            &evaluation(Some(3), None),
            "ordo",
            [CreationOption::SlsaLevel(2), CreationOption::SafeMode],
        )
        .expect("level before safe mode is allowed");
        assert_eq!(level_of(&att), Some(&serde_json::json!(2)));
    }

    #[test]
    fn serialization_is_deterministic_for_fixed_time() {
        let time = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .expect("time")
            .with_timezone(&Utc);
        let make = || {
            create(
                &evaluation(Some(3), Some("prod")),
                "ordo",
                [CreationOption::CreationTime(time)],
            )
            .and_then(|a| a.to_bytes())
            .expect("bytes")
        };
        assert_eq!(make(), make());
    }
}
