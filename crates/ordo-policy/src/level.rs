//! SLSA build levels.
//!
//! See: <https://slsa.dev/spec/v1.0/levels>

use std::fmt;

use serde::{Deserialize, Serialize};

/// A SLSA build level in the range `0..=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct SlsaLevel(u8);

impl SlsaLevel {
    /// The highest level a build root may be granted.
    pub const MAX: Self = Self(4);

    /// Build a level from an untrusted integer.
    ///
    /// Returns `None` if `value` is outside `0..=4`.
    #[must_use]
    pub fn new(value: i64) -> Option<Self> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= Self::MAX.0)
            .map(Self)
    }

    /// The level as a plain integer.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for SlsaLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl TryFrom<i64> for SlsaLevel {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("SLSA level {value} is outside 0..=4"))
    }
}

impl From<SlsaLevel> for u8 {
    fn from(level: SlsaLevel) -> Self {
        level.0
    }
}
