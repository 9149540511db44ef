//! Digest sets: algorithm name to hex digest.
//!
//! A [`DigestSet`] identifies artifact content. Comparison between two sets
//! is subset-based: a set *contains* another when every entry of the other
//! appears in it with the same value. Algorithms only one side knows about
//! are ignored.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::PolicyError;

/// A mapping of digest algorithm names to hex-encoded digest values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DigestSet(BTreeMap<String, String>);

impl DigestSet {
    /// Create a digest set from an existing map. The set is not validated.
    #[must_use]
    pub const fn new(digests: BTreeMap<String, String>) -> Self {
        Self(digests)
    }

    /// A single-entry `sha256` set over `data`.
    #[must_use]
    pub fn sha256_of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        std::iter::once(("sha256".to_owned(), hex::encode(hasher.finalize()))).collect()
    }

    /// Check that the set is non-empty and has no empty names or values.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidField`] describing the first problem.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.0.is_empty() {
            return Err(PolicyError::InvalidField("digest set is empty".to_owned()));
        }
        for (alg, value) in &self.0 {
            if alg.is_empty() {
                return Err(PolicyError::InvalidField(format!(
                    "digest set has an empty algorithm name (value `{value}`)"
                )));
            }
            if value.is_empty() {
                return Err(PolicyError::InvalidField(format!(
                    "digest set has an empty value for `{alg}`"
                )));
            }
        }
        Ok(())
    }

    /// Check that every entry of `subset` is present in `self` with the
    /// same value.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidField`] if either set fails
    /// [`validate`](Self::validate), and [`PolicyError::Mismatch`] for the
    /// first entry of `subset` that `self` lacks or disagrees on.
    pub fn contains(&self, subset: &Self) -> Result<(), PolicyError> {
        self.validate()?;
        subset.validate()?;
        for (alg, expected) in &subset.0 {
            match self.0.get(alg) {
                Some(actual) if actual == expected => {}
                Some(actual) => {
                    return Err(PolicyError::Mismatch(format!(
                        "digest `{alg}`: expected {expected}, got {actual}"
                    )));
                }
                None => {
                    return Err(PolicyError::Mismatch(format!(
                        "digest `{alg}` not present (have: {})",
                        self.algorithms().collect::<Vec<_>>().join(", ")
                    )));
                }
            }
        }
        Ok(())
    }

    /// The value recorded for `algorithm`, if any.
    #[must_use]
    pub fn get(&self, algorithm: &str) -> Option<&str> {
        self.0.get(algorithm).map(String::as_str)
    }

    /// Algorithm names, in sorted order.
    pub fn algorithms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `(algorithm, value)` pairs, in sorted algorithm order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for DigestSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for DigestSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (alg, value) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{alg}:{value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Parses `alg:value[,alg:value...]`, e.g. `sha256:ab12,sha512:cd34`.
impl FromStr for DigestSet {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut digests = BTreeMap::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((alg, value)) = part.split_once(':') else {
                return Err(PolicyError::InvalidInput(format!(
                    "digest `{part}` is not of the form alg:value"
                )));
            };
            if digests.insert(alg.to_owned(), value.to_owned()).is_some() {
                return Err(PolicyError::InvalidInput(format!(
                    "digest algorithm `{alg}` given twice"
                )));
            }
        }
        let set = Self(digests);
        set.validate()?;
        Ok(set)
    }
}
