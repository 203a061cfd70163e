//! Export fingerprints.
//!
//! A fingerprint identifies one version of a language's translation set. It
//! is the latest mutation stamp recorded for the language, or the sentinel
//! `0` for a language that has never been written to. Because the mutation
//! clock never repeats a stamp, any write produces a new fingerprint.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Millis;

/// Freshness marker for a language's translation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(Millis);

impl Fingerprint {
    /// Fingerprint of a language with no recorded mutations.
    pub const SENTINEL: Self = Self(0);

    /// Builds a fingerprint from the result of the store's latest-mutation
    /// aggregate. `None` maps to [`Fingerprint::SENTINEL`].
    #[must_use]
    pub fn from_latest_mutation(latest: Option<Millis>) -> Self {
        latest.map_or(Self::SENTINEL, Self)
    }

    #[must_use]
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// The underlying mutation stamp.
    #[must_use]
    pub fn stamp(&self) -> Millis {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
