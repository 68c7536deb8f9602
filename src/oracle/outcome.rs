//! # Outcome Labels and Digests
//!
//! An outcome is a trimmed label declared when an event is created. Its
//! digest is the message the oracle signs when it attests that outcome.
//!
//! ## Canonical Form
//!
//! - Surrounding whitespace is removed, every other byte is preserved
//! - Comparison between labels ignores case
//! - The digest is computed over the canonical label *as declared*, so the
//!   casing recorded at event creation is the one the oracle must sign

use crate::config::tags;
use crate::error::{DlcError, DlcResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};

/// BIP-340 tagged hash: `SHA256(SHA256(tag) || SHA256(tag) || data)`.
pub fn tagged_hash(tag: &str, data: &[u8]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    hasher.finalize().into()
}

/// 32-byte message an oracle signs for one outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OutcomeDigest([u8; 32]);

impl OutcomeDigest {
    pub fn to_byte_array(self) -> [u8; 32] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for OutcomeDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Canonicalize a label: trim surrounding whitespace only.
pub fn canonicalize(label: &str) -> &str {
    label.trim()
}

/// Digest of a label after canonicalization.
pub fn digest(label: &str) -> OutcomeDigest {
    OutcomeDigest(tagged_hash(tags::OUTCOME, canonicalize(label).as_bytes()))
}

/// A declared possible result of an event.
#[derive(Clone, Debug)]
pub struct Outcome {
    label: String,
}

impl Outcome {
    /// Create an outcome from a label, rejecting labels that are empty once trimmed.
    pub fn new(label: impl AsRef<str>) -> DlcResult<Self> {
        let canonical = canonicalize(label.as_ref());
        if canonical.is_empty() {
            return Err(DlcError::InvalidOutcome {
                reason: "outcome label is empty".to_string(),
            });
        }
        Ok(Self {
            label: canonical.to_string(),
        })
    }

    /// Canonical label as declared
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn digest(&self) -> OutcomeDigest {
        digest(&self.label)
    }

    /// Case-insensitive comparison against caller input
    pub fn matches(&self, input: &str) -> bool {
        fold(&self.label) == fold(canonicalize(input))
    }

    /// Find the declared outcome matching `input`, returning the declared casing.
    pub fn resolve<'a>(declared: &'a [Outcome], input: &str) -> DlcResult<&'a Outcome> {
        declared
            .iter()
            .find(|o| o.matches(input))
            .ok_or_else(|| DlcError::OutcomeNotFound {
                outcome: canonicalize(input).to_string(),
            })
    }

    /// Build a declared outcome set, rejecting empty sets and duplicates.
    pub fn declare<I, S>(labels: I) -> DlcResult<Vec<Outcome>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut outcomes: Vec<Outcome> = Vec::new();
        for label in labels {
            let outcome = Outcome::new(label)?;
            if outcomes.contains(&outcome) {
                return Err(DlcError::DuplicateOutcome {
                    outcome: outcome.label,
                });
            }
            outcomes.push(outcome);
        }
        if outcomes.is_empty() {
            return Err(DlcError::InvalidOutcome {
                reason: "an event needs at least one outcome".to_string(),
            });
        }
        Ok(outcomes)
    }
}

fn fold(label: &str) -> String {
    label.to_lowercase()
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        fold(&self.label) == fold(&other.label)
    }
}

impl Eq for Outcome {}

impl Hash for Outcome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fold(&self.label).hash(state);
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label)
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Outcome::new(label).map_err(serde::de::Error::custom)
    }
}
