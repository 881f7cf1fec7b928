use depot_digest::{DigestParseError, DigestValue, HashAlgorithm};

/// The format of a manifest: which algorithm hashes file contents and the
/// serialized listing, and thereby how digest values are encoded.
///
/// Generation and verification must speak the same format, so the format is
/// always derived from the digest the caller expects
/// ([`ManifestFormat::from_digest`]) or from the prefix of a stored entry's
/// directory name ([`ManifestFormat::from_prefix`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManifestFormat {
    algorithm: HashAlgorithm,
}

impl ManifestFormat {
    /// Creates a format for the given algorithm.
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    /// Derives the format from a digest-string prefix such as `sha256new`.
    pub fn from_prefix(prefix: &str) -> Result<Self, DigestParseError> {
        HashAlgorithm::from_prefix(prefix)
            .map(Self::new)
            .ok_or_else(|| DigestParseError::UnknownPrefix(prefix.to_string()))
    }

    /// Derives the format matching an expected digest value, so that
    /// generation speaks the same algorithm as the caller's expectation.
    pub fn from_digest(digest: &DigestValue) -> Self {
        Self::new(digest.algorithm())
    }

    /// The hash algorithm of this format.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Hashes the serialized manifest text into the digest value that names
    /// the implementation.
    pub fn digest_of_text(&self, text: &str) -> DigestValue {
        let value = self.algorithm.hash_bytes(text.as_bytes());
        DigestValue::new(self.algorithm, value)
            .expect("encoded hash output is always a valid digest value")
    }
}
