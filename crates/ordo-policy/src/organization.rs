//! The organization policy: trusted build roots and the minimum level.
//!
//! The organization owns the list of build platforms it trusts (its roots of
//! trust). Each root has an opaque platform identity, a human name that
//! project policies refer to, and the SLSA level releases built on it are
//! entitled to.
//!
//! ```json
//! {
//!   "format": 1,
//!   "roots": [
//!     { "id": "https://github.com/slsa-framework/slsa-github-generator/.github/workflows/builder_go_slsa3.yml@refs/tags/v1.9.0",
//!       "name": "github_actions_level_3", "slsaLevel": 3 }
//!   ],
//!   "build": { "requireSlsaLevel": 2 }
//! }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::io::Read;

use serde::Deserialize;
use tracing::debug;

use crate::SUPPORTED_FORMAT;
use crate::error::PolicyError;
use crate::level::SlsaLevel;

/// Organization policy document as it appears on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OrganizationDocument {
    format: u32,
    roots: Vec<RootDocument>,
    build: Option<BuildDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RootDocument {
    id: String,
    name: String,
    slsa_level: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BuildDocument {
    require_slsa_level: Option<i64>,
}

/// A trusted build platform registered by the organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRoot {
    /// Platform identity, as the build verifier expects it.
    pub id: String,
    /// Human name, referenced by project policies.
    pub name: String,
    /// Level granted to releases built on this root.
    pub slsa_level: SlsaLevel,
}

/// A validated organization policy.
///
/// Constructed once from a document and read-only afterward.
#[derive(Debug, Clone)]
pub struct OrganizationPolicy {
    roots: Vec<BuildRoot>,
    minimum_slsa_level: SlsaLevel,
}

impl OrganizationPolicy {
    /// Parse and validate an organization policy from a reader.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Io`] if the reader fails and
    /// [`PolicyError::InvalidField`] for any malformed or invalid content.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self, PolicyError> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::from_slice(&data)
    }

    /// Parse and validate an organization policy from bytes.
    ///
    /// Checks, in order: format version, the root list (non-empty, every
    /// root named and identified, levels in range, IDs and names unique),
    /// then the minimum level requirement.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidField`] on the first violation.
    pub fn from_slice(data: &[u8]) -> Result<Self, PolicyError> {
        let doc: OrganizationDocument = serde_json::from_slice(data).map_err(|e| {
            PolicyError::InvalidField(format!("failed to parse organization policy: {e}"))
        })?;

        if doc.format != SUPPORTED_FORMAT {
            return Err(PolicyError::InvalidField(format!(
                "organization policy format {} is not supported (expected {SUPPORTED_FORMAT})",
                doc.format
            )));
        }

        let roots = validate_roots(doc.roots)?;

        let minimum = doc
            .build
            .and_then(|b| b.require_slsa_level)
            .ok_or_else(|| {
                PolicyError::InvalidField("build.requireSlsaLevel is missing".to_owned())
            })?;
        let minimum_slsa_level = SlsaLevel::new(minimum).ok_or_else(|| {
            PolicyError::InvalidField(format!(
                "build.requireSlsaLevel {minimum} is outside 0..=4"
            ))
        })?;

        debug!(
            roots = roots.len(),
            minimum = %minimum_slsa_level,
            "loaded organization policy"
        );

        Ok(Self {
            roots,
            minimum_slsa_level,
        })
    }

    /// Platform identity of the root registered under `name`.
    #[must_use]
    pub fn builder_id(&self, name: &str) -> Option<&str> {
        self.root(name).map(|r| r.id.as_str())
    }

    /// Level granted by the root registered under `name`.
    ///
    /// `None` means the name is not registered. Callers validate existence
    /// beforehand, so this never fails an evaluation by itself.
    #[must_use]
    pub fn slsa_level(&self, name: &str) -> Option<SlsaLevel> {
        self.root(name).map(|r| r.slsa_level)
    }

    /// Human names of every registered root.
    #[must_use]
    pub fn builder_names(&self) -> BTreeSet<String> {
        self.roots.iter().map(|r| r.name.clone()).collect()
    }

    /// Registered roots, in document order.
    #[must_use]
    pub fn roots(&self) -> &[BuildRoot] {
        &self.roots
    }

    /// The minimum level the organization requires of its releases.
    #[must_use]
    pub const fn minimum_slsa_level(&self) -> SlsaLevel {
        self.minimum_slsa_level
    }

    fn root(&self, name: &str) -> Option<&BuildRoot> {
        self.roots.iter().find(|r| r.name == name)
    }
}

fn validate_roots(docs: Vec<RootDocument>) -> Result<Vec<BuildRoot>, PolicyError> {
    if docs.is_empty() {
        return Err(PolicyError::InvalidField(
            "organization policy has no roots".to_owned(),
        ));
    }

    let mut ids = HashSet::new();
    let mut names = HashSet::new();
    let mut roots = Vec::with_capacity(docs.len());

    for (i, doc) in docs.into_iter().enumerate() {
        if doc.id.is_empty() {
            return Err(PolicyError::InvalidField(format!("roots[{i}].id is empty")));
        }
        if doc.name.is_empty() {
            return Err(PolicyError::InvalidField(format!(
                "roots[{i}].name is empty"
            )));
        }
        let raw = doc.slsa_level.ok_or_else(|| {
            PolicyError::InvalidField(format!("roots[{i}].slsaLevel is missing"))
        })?;
        let slsa_level = SlsaLevel::new(raw).ok_or_else(|| {
            PolicyError::InvalidField(format!(
                "roots[{i}].slsaLevel {raw} is outside 0..=4"
            ))
        })?;
        if !ids.insert(doc.id.clone()) {
            return Err(PolicyError::InvalidField(format!(
                "root id `{}` is registered more than once",
                doc.id
            )));
        }
        if !names.insert(doc.name.clone()) {
            return Err(PolicyError::InvalidField(format!(
                "root name `{}` is registered more than once",
                doc.name
            )));
        }
        roots.push(BuildRoot {
            id: doc.id,
            name: doc.name,
            slsa_level,
        });
    }

    Ok(roots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org_json(roots: &serde_json::Value, min: &serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "format": 1,
            "roots": roots,
            "build": { "requireSlsaLevel": min }
        }))
        .expect("serialize")
    }

    fn two_roots() -> Vec<u8> {
        org_json(
            &serde_json::json!([
                { "id": "gh", "name": "github_l3", "slsaLevel": 3 },
                { "id": "gcb", "name": "gcb_l2", "slsaLevel": 2 }
            ]),
            &serde_json::json!(2),
        )
    }

    fn assert_invalid_field(data: &[u8]) {
        let result = OrganizationPolicy::from_slice(data);
        assert!(
            matches!(result, Err(PolicyError::InvalidField(_))),
            "expected InvalidField, got {result:?}"
        );
    }

    #[test]
    fn loads_valid_policy() {
        let org = OrganizationPolicy::from_slice(&two_roots()).expect("valid");
        assert_eq!(org.roots().len(), 2);
        assert_eq!(org.builder_id("github_l3"), Some("gh"));
        assert_eq!(org.slsa_level("gcb_l2").map(SlsaLevel::get), Some(2));
        assert_eq!(org.minimum_slsa_level().get(), 2);
        assert_eq!(
            org.builder_names().into_iter().collect::<Vec<_>>(),
            vec!["gcb_l2".to_owned(), "github_l3".to_owned()]
        );
    }

    #[test]
    fn from_reader_matches_from_slice() {
        let data = two_roots();
        let org = OrganizationPolicy::from_reader(data.as_slice()).expect("valid");
        assert_eq!(org.builder_id("gcb_l2"), Some("gcb"));
    }

    #[test]
    fn unknown_name_lookups_are_none() {
        let org = OrganizationPolicy::from_slice(&two_roots()).expect("valid");
        assert_eq!(org.builder_id("nope"), None);
        assert_eq!(org.slsa_level("nope"), None);
    }

    #[test]
    fn malformed_json_is_invalid_field() {
        assert_invalid_field(b"{ not json");
    }

    #[test]
    fn wrong_format_is_invalid_field() {
        let data = serde_json::to_vec(&serde_json::json!({
            "format": 2,
            "roots": [{ "id": "gh", "name": "github_l3", "slsaLevel": 3 }],
            "build": { "requireSlsaLevel": 2 }
        }))
        .expect("serialize");
        assert_invalid_field(&data);
    }

    #[test]
    fn missing_format_is_invalid_field() {
        let data = serde_json::to_vec(&serde_json::json!({
            "roots": [{ "id": "gh", "name": "github_l3", "slsaLevel": 3 }],
            "build": { "requireSlsaLevel": 2 }
        }))
        .expect("serialize");
        assert_invalid_field(&data);
    }

    #[test]
    fn no_roots_is_invalid_field() {
        assert_invalid_field(&org_json(&serde_json::json!([]), &serde_json::json!(1)));
    }

    #[test]
    fn empty_id_or_name_is_invalid_field() {
        assert_invalid_field(&org_json(
            &serde_json::json!([{ "id": "", "name": "n", "slsaLevel": 1 }]),
            &serde_json::json!(1),
        ));
        assert_invalid_field(&org_json(
            &serde_json::json!([{ "id": "i", "name": "", "slsaLevel": 1 }]),
            &serde_json::json!(1),
        ));
    }

    #[test]
    fn level_out_of_range_is_invalid_field() {
        assert_invalid_field(&org_json(
            &serde_json::json!([{ "id": "i", "name": "n", "slsaLevel": 5 }]),
            &serde_json::json!(1),
        ));
        assert_invalid_field(&org_json(
            &serde_json::json!([{ "id": "i", "name": "n", "slsaLevel": -1 }]),
            &serde_json::json!(1),
        ));
        assert_invalid_field(&org_json(
            &serde_json::json!([{ "id": "i", "name": "n" }]),
            &serde_json::json!(1),
        ));
    }

    #[test]
    fn duplicate_id_is_invalid_field() {
        assert_invalid_field(&org_json(
            &serde_json::json!([
                { "id": "gh", "name": "a", "slsaLevel": 3 },
                { "id": "gh", "name": "b", "slsaLevel": 2 }
            ]),
            &serde_json::json!(1),
        ));
    }

    #[test]
    fn duplicate_name_is_invalid_field() {
        assert_invalid_field(&org_json(
            &serde_json::json!([
                { "id": "gh", "name": "a", "slsaLevel": 3 },
                { "id": "gcb", "name": "a", "slsaLevel": 2 }
            ]),
            &serde_json::json!(1),
        ));
    }

    #[test]
    fn minimum_level_required_and_in_range() {
        let roots = serde_json::json!([{ "id": "gh", "name": "a", "slsaLevel": 3 }]);
        assert_invalid_field(&org_json(&roots, &serde_json::json!(5)));
        assert_invalid_field(&org_json(&roots, &serde_json::Value::Null));

        let no_build = serde_json::to_vec(&serde_json::json!({
            "format": 1,
            "roots": roots,
        }))
        .expect("serialize");
        assert_invalid_field(&no_build);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Roots with distinct IDs and names and valid levels always load.
            #[test]
            fn distinct_roots_load(levels in prop::collection::vec(0i64..=4, 1..6)) {
                let roots: Vec<_> = levels
                    .iter()
                    .enumerate()
                    .map(|(i, l)| serde_json::json!({
                        "id": format!("id-{i}"),
                        "name": format!("name-{i}"),
                        "slsaLevel": l,
                    }))
                    .collect();
                let data = org_json(&serde_json::Value::Array(roots), &serde_json::json!(0));
                let org = OrganizationPolicy::from_slice(&data);
                prop_assert!(org.is_ok());
                prop_assert_eq!(org.map(|o| o.roots().len()).unwrap_or(0), levels.len());
            }

            /// Any repeated ID or name fails construction.
            #[test]
            fn repeated_identity_fails(count in 2usize..6, dup_id in any::<bool>()) {
                let roots: Vec<_> = (0..count)
                    .map(|i| {
                        let (id, name) = if dup_id {
                            ("same".to_owned(), format!("name-{i}"))
                        } else {
                            (format!("id-{i}"), "same".to_owned())
                        };
                        serde_json::json!({ "id": id, "name": name, "slsaLevel": 1 })
                    })
                    .collect();
                let data = org_json(&serde_json::Value::Array(roots), &serde_json::json!(0));
                prop_assert!(matches!(
                    OrganizationPolicy::from_slice(&data),
                    Err(PolicyError::InvalidField(_))
                ));
            }
        }
    }
}
