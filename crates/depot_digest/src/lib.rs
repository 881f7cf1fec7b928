#![deny(missing_docs)]

//! Digest values and hashing helpers for the depot implementation cache.
//!
//! Every implementation cached by depot is identified by a cryptographic
//! digest of its canonical manifest. Four digest generations coexist so that
//! stores written by older clients remain readable: two legacy SHA-1 based
//! formats and two SHA-256 based ones. This crate provides:
//!
//! - [`HashAlgorithm`]: the algorithm tag that drives hash-function
//!   selection, string-prefix parsing and value encoding.
//! - [`DigestValue`]: one parsed, algorithm-tagged digest string.
//! - [`ManifestDigest`]: a set of digest values (at most one per algorithm)
//!   identifying a single implementation across algorithm migrations.
//! - [`compute_file_digest`] / [`compute_bytes_digest`]: generic helpers
//!   built on the [RustCrypto/hashes](https://github.com/RustCrypto/hashes)
//!   [`Digest`] trait.
//!
//! # Examples
//!
//! ```rust
//! use depot_digest::{DigestValue, HashAlgorithm};
//!
//! let digest: DigestValue =
//!     "sha256=9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
//!         .parse()
//!         .unwrap();
//! assert_eq!(digest.algorithm(), HashAlgorithm::Sha256);
//! ```

mod manifest_digest;

pub use digest;

pub use manifest_digest::{DigestParseError, DigestValue, ManifestDigest};

use digest::{Digest, Output};
use std::{
    fs::File,
    io::Write,
    path::Path,
};

/// The base32 alphabet used by the `*new` digest generations: RFC 4648,
/// upper case, without padding.
const BASE32: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// Compute a hash of the file at the specified location.
pub fn compute_file_digest<D: Digest + Default + Write>(
    path: impl AsRef<Path>,
) -> Result<Output<D>, std::io::Error> {
    let mut file = File::open(path)?;

    let mut hasher = D::default();
    std::io::copy(&mut file, &mut hasher)?;

    Ok(hasher.finalize())
}

/// Compute a hash of the specified bytes.
pub fn compute_bytes_digest<D: Digest + Default + Write>(bytes: impl AsRef<[u8]>) -> Output<D> {
    let mut hasher = D::default();
    hasher.update(bytes);
    hasher.finalize()
}

/// Identifies one of the digest generations understood by the store.
///
/// The variant order is the strength order: `Sha256New` is preferred over
/// `Sha256`, which is preferred over the legacy SHA-1 generations. Deriving
/// [`Ord`] on this order makes "pick the strongest available digest" a plain
/// `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashAlgorithm {
    /// Legacy SHA-1 with hex-encoded values (`sha1=...`).
    Sha1,
    /// SHA-1 with base32-encoded values (`sha1new=...`).
    Sha1New,
    /// SHA-256 with hex-encoded values (`sha256=...`).
    Sha256,
    /// SHA-256 with base32-encoded values and an underscore separator
    /// (`sha256new_...`).
    Sha256New,
}

impl HashAlgorithm {
    /// All algorithms, strongest first. This is the probe order for
    /// algorithm-tolerant store lookups and for prefix parsing (longer
    /// prefixes shadow their legacy counterparts).
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha256New,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha1New,
        HashAlgorithm::Sha1,
    ];

    /// The digest-string prefix, without the separator.
    pub fn prefix(self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha1New => "sha1new",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha256New => "sha256new",
        }
    }

    /// The character separating the prefix from the encoded value.
    pub fn separator(self) -> char {
        match self {
            HashAlgorithm::Sha256New => '_',
            _ => '=',
        }
    }

    /// Looks up an algorithm by its digest-string prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.prefix() == prefix)
    }

    /// Encodes a raw digest in this generation's value encoding: lowercase
    /// hex for the legacy generations, unpadded upper-case base32 for the
    /// `*new` ones.
    pub fn encode(self, digest: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Sha256 => hex::encode(digest),
            HashAlgorithm::Sha1New | HashAlgorithm::Sha256New => base32::encode(BASE32, digest),
        }
    }

    /// The length of an encoded digest value.
    pub fn encoded_len(self) -> usize {
        match self {
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha1New => 32,
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha256New => 52,
        }
    }

    /// Whether `value` has the exact length and character set of an encoded
    /// digest of this generation.
    pub fn is_valid_value(self, value: &str) -> bool {
        if value.len() != self.encoded_len() {
            return false;
        }
        match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Sha256 => value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)),
            HashAlgorithm::Sha1New | HashAlgorithm::Sha256New => value
                .bytes()
                .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b)),
        }
    }

    /// Hashes a byte slice and returns the encoded value.
    pub fn hash_bytes(self, bytes: &[u8]) -> String {
        let raw = match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Sha1New => {
                compute_bytes_digest::<sha1::Sha1>(bytes).to_vec()
            }
            HashAlgorithm::Sha256 | HashAlgorithm::Sha256New => {
                compute_bytes_digest::<sha2::Sha256>(bytes).to_vec()
            }
        };
        self.encode(&raw)
    }

    /// Hashes the contents of a file and returns the encoded value.
    pub fn hash_file(self, path: impl AsRef<Path>) -> Result<String, std::io::Error> {
        let raw = match self {
            HashAlgorithm::Sha1 | HashAlgorithm::Sha1New => {
                compute_file_digest::<sha1::Sha1>(path)?.to_vec()
            }
            HashAlgorithm::Sha256 | HashAlgorithm::Sha256New => {
                compute_file_digest::<sha2::Sha256>(path)?.to_vec()
            }
        };
        Ok(self.encode(&raw))
    }
}

#[cfg(test)]
mod test {
    use super::HashAlgorithm;
    use rstest::rstest;

    #[test]
    fn test_compute_file_sha256() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file_path = temp_dir.path().join("test");
        std::fs::write(&file_path, "Hello, world!").unwrap();
        let hash = super::compute_file_digest::<sha2::Sha256>(&file_path).unwrap();

        assert_eq!(
            format!("{hash:x}"),
            "315f5bdb76d078c43b8ac0064e4a0164612b1fce77c869345bfc94c75894edd3"
        );
    }

    #[rstest]
    #[case(HashAlgorithm::Sha1, "sha1", '=')]
    #[case(HashAlgorithm::Sha1New, "sha1new", '=')]
    #[case(HashAlgorithm::Sha256, "sha256", '=')]
    #[case(HashAlgorithm::Sha256New, "sha256new", '_')]
    fn test_prefixes(
        #[case] alg: HashAlgorithm,
        #[case] prefix: &str,
        #[case] separator: char,
    ) {
        assert_eq!(alg.prefix(), prefix);
        assert_eq!(alg.separator(), separator);
        assert_eq!(HashAlgorithm::from_prefix(prefix), Some(alg));
    }

    #[test]
    fn test_strength_order() {
        assert!(HashAlgorithm::Sha256New > HashAlgorithm::Sha256);
        assert!(HashAlgorithm::Sha256 > HashAlgorithm::Sha1New);
        assert!(HashAlgorithm::Sha1New > HashAlgorithm::Sha1);
    }

    #[rstest]
    #[case(HashAlgorithm::Sha1, 40)]
    #[case(HashAlgorithm::Sha1New, 32)]
    #[case(HashAlgorithm::Sha256, 64)]
    #[case(HashAlgorithm::Sha256New, 52)]
    fn test_encoded_len_matches_hash_output(#[case] alg: HashAlgorithm, #[case] len: usize) {
        let value = alg.hash_bytes(b"test");
        assert_eq!(value.len(), len);
        assert!(alg.is_valid_value(&value));
    }

    #[test]
    fn test_known_hex_values() {
        assert_eq!(
            HashAlgorithm::Sha1.hash_bytes(b"test"),
            "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3"
        );
        assert_eq!(
            HashAlgorithm::Sha256.hash_bytes(b"test"),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_base32_encoding() {
        // 20 zero bytes encode to 32 'A's, 32 zero bytes to 52.
        assert_eq!(HashAlgorithm::Sha1New.encode(&[0u8; 20]), "A".repeat(32));
        assert_eq!(HashAlgorithm::Sha256New.encode(&[0u8; 32]), "A".repeat(52));
    }

    #[test]
    fn test_value_charset() {
        assert!(!HashAlgorithm::Sha1.is_valid_value(&"G".repeat(40)));
        assert!(!HashAlgorithm::Sha1.is_valid_value(&"a".repeat(39)));
        // Hex is canonical in lower case only.
        assert!(!HashAlgorithm::Sha256.is_valid_value(&"A".repeat(64)));
        assert!(!HashAlgorithm::Sha256New.is_valid_value(&"a".repeat(52)));
        assert!(!HashAlgorithm::Sha256New.is_valid_value(&"1".repeat(52)));
    }
}
