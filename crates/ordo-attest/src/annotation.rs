//! Loosely-typed annotation values and the optional-value matching rule.
//!
//! Annotations travel as free-form JSON. Readers that need a string ask for
//! one explicitly and get an error if the value has another type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AttestationError;

/// An annotation value: a string, a number, or anything else JSON allows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnnotationValue {
    /// A string value.
    Text(String),
    /// A numeric value.
    Number(serde_json::Number),
    /// Any other JSON value (booleans, arrays, objects, null).
    Other(serde_json::Value),
}

impl AnnotationValue {
    /// The value as a string.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationError::InvalidField`] if the value is not a
    /// string. `key` names the annotation in the message.
    pub fn as_text(&self, key: &str) -> Result<&str, AttestationError> {
        match self {
            Self::Text(s) => Ok(s),
            other => Err(AttestationError::InvalidField(format!(
                "annotation `{key}` is not a string: {other}"
            ))),
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Number(n) => fmt::Display::fmt(n, f),
            Self::Other(v) => fmt::Display::fmt(v, f),
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for AnnotationValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// Match an optional string against an expected value.
///
/// An empty `expected` asserts the value is unset: it passes when `actual`
/// is absent or empty. A non-empty `expected` requires `actual` to be
/// present and equal.
///
/// # Errors
///
/// Returns [`AttestationError::Mismatch`] naming `what` on disagreement.
pub fn match_optional(
    actual: Option<&str>,
    expected: &str,
    what: &str,
) -> Result<(), AttestationError> {
    match (actual, expected.is_empty()) {
        (None, true) => Ok(()),
        (Some(a), true) if a.is_empty() => Ok(()),
        (Some(a), true) => Err(AttestationError::Mismatch(format!(
            "{what}: expected unset, got `{a}`"
        ))),
        (None, false) => Err(AttestationError::Mismatch(format!(
            "{what}: expected `{expected}`, got none"
        ))),
        (Some(a), false) if a == expected => Ok(()),
        (Some(a), false) => Err(AttestationError::Mismatch(format!(
            "{what}: expected `{expected}`, got `{a}`"
        ))),
    }
}

/// Match an optional annotation against an expected string value, using the
/// rule of [`match_optional`].
///
/// # Errors
///
/// Returns [`AttestationError::InvalidField`] if the annotation is present
/// but not a string, and [`AttestationError::Mismatch`] on disagreement.
pub fn match_annotation(
    actual: Option<&AnnotationValue>,
    key: &str,
    expected: &str,
) -> Result<(), AttestationError> {
    let actual = actual.map(|v| v.as_text(key)).transpose()?;
    match_optional(actual, expected, &format!("annotation `{key}`"))
}
