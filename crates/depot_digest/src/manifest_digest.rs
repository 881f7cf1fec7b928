//! Parsed digest strings and the multi-algorithm digest sets used as store
//! keys.

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::HashAlgorithm;

/// An error returned when a digest string cannot be parsed.
#[derive(Debug, thiserror::Error)]
pub enum DigestParseError {
    /// The string does not start with a known algorithm prefix.
    #[error("unknown digest prefix in '{0}'")]
    UnknownPrefix(String),

    /// The value part has the wrong length or character set for its
    /// algorithm.
    #[error("malformed digest value in '{0}'")]
    MalformedValue(String),
}

/// One parsed, algorithm-tagged digest value, e.g. `sha256new_LDPU3H...`.
///
/// Ordering is by algorithm strength first, so the strongest of several
/// values is simply their maximum.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DigestValue {
    algorithm: HashAlgorithm,
    value: String,
}

impl DigestValue {
    /// Creates a digest value from an algorithm and an already-encoded
    /// value.
    ///
    /// Fails with [`DigestParseError::MalformedValue`] if `value` does not
    /// have the algorithm's length and character set.
    pub fn new(algorithm: HashAlgorithm, value: String) -> Result<Self, DigestParseError> {
        if !algorithm.is_valid_value(&value) {
            return Err(DigestParseError::MalformedValue(format!(
                "{}{}{}",
                algorithm.prefix(),
                algorithm.separator(),
                value
            )));
        }
        Ok(Self { algorithm, value })
    }

    /// The algorithm generation this value belongs to.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// The encoded value, without prefix.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Consumes the digest value, returning the encoded value string.
    pub fn into_value(self) -> String {
        self.value
    }
}

impl Display for DigestValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.algorithm.prefix(),
            self.algorithm.separator(),
            self.value
        )
    }
}

impl FromStr for DigestValue {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Strongest first, so `sha256new` and `sha1new` shadow the prefixes
        // they share with their legacy counterparts.
        for algorithm in HashAlgorithm::ALL {
            let mut token = algorithm.prefix().to_string();
            token.push(algorithm.separator());
            if let Some(value) = s.strip_prefix(&token) {
                if !algorithm.is_valid_value(value) {
                    return Err(DigestParseError::MalformedValue(s.to_string()));
                }
                return Ok(Self {
                    algorithm,
                    value: value.to_string(),
                });
            }
        }
        Err(DigestParseError::UnknownPrefix(s.to_string()))
    }
}

/// The digest identity of one implementation, potentially expressed in
/// several algorithm generations at once.
///
/// Holds at most one value per [`HashAlgorithm`]. A usable digest has at
/// least one slot populated. Feeds list several generations for the same
/// implementation so that stores written under an older algorithm remain
/// addressable by newer clients; [`ManifestDigest::matches`] is the lookup
/// comparison that makes this work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDigest {
    values: BTreeMap<HashAlgorithm, String>,
}

impl ManifestDigest {
    /// Creates an empty digest set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a single prefixed digest string into a set with one slot
    /// populated.
    pub fn parse(s: &str) -> Result<Self, DigestParseError> {
        s.parse::<DigestValue>().map(Self::from)
    }

    /// Inserts a digest value, replacing any previous value for the same
    /// algorithm.
    pub fn insert(&mut self, digest: DigestValue) {
        self.values.insert(digest.algorithm, digest.value);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, digest: DigestValue) -> Self {
        self.insert(digest);
        self
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The value stored for a specific algorithm, if any.
    pub fn get(&self, algorithm: HashAlgorithm) -> Option<DigestValue> {
        self.values.get(&algorithm).map(|value| DigestValue {
            algorithm,
            value: value.clone(),
        })
    }

    /// The strongest populated digest value, used for naming new store
    /// entries.
    pub fn best(&self) -> Option<DigestValue> {
        self.values
            .iter()
            .next_back()
            .map(|(&algorithm, value)| DigestValue {
                algorithm,
                value: value.clone(),
            })
    }

    /// All populated digest values, strongest first. This is the probe
    /// order for store lookups.
    pub fn available_digests(&self) -> Vec<DigestValue> {
        self.values
            .iter()
            .rev()
            .map(|(&algorithm, value)| DigestValue {
                algorithm,
                value: value.clone(),
            })
            .collect()
    }

    /// Partial equality: true if any algorithm populated in both sets
    /// carries the same value.
    ///
    /// This is the comparison used for store lookups, NOT full equality:
    /// it tolerates algorithm migration, at the cost of trusting that a
    /// digest set never pairs one implementation's value under one
    /// algorithm with another's under a different one. Engineered
    /// cross-algorithm collisions are not defended against.
    pub fn matches(&self, other: &ManifestDigest) -> bool {
        self.values.iter().any(|(algorithm, value)| {
            other
                .values
                .get(algorithm)
                .is_some_and(|other_value| other_value == value)
        })
    }
}

impl From<DigestValue> for ManifestDigest {
    fn from(digest: DigestValue) -> Self {
        Self::new().with(digest)
    }
}

impl FromStr for ManifestDigest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Display for ManifestDigest {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.best() {
            Some(digest) => digest.fmt(f),
            None => f.write_str("(empty digest)"),
        }
    }
}
