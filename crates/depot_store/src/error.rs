use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    path::PathBuf,
};

use depot_digest::{DigestValue, ManifestDigest};
use depot_manifest::{Manifest, ManifestError};

/// Diagnostic payload for a failed digest comparison: staged or stored
/// content does not match its claimed identity.
///
/// Carries both manifests when available so the damage can be narrowed down
/// to individual entries instead of just two differing hash strings.
#[derive(Debug)]
pub struct DigestMismatch {
    /// The digest the content was supposed to have.
    pub expected: DigestValue,
    /// The digest that was actually calculated.
    pub actual: DigestValue,
    /// The manifest behind `expected`, if one was persisted.
    pub expected_manifest: Option<Manifest>,
    /// The manifest behind `actual`, if it was generated.
    pub actual_manifest: Option<Manifest>,
}

impl Display for DigestMismatch {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "digest mismatch: expected {}, calculated {}",
            self.expected, self.actual
        )?;
        if let (Some(expected), Some(actual)) = (&self.expected_manifest, &self.actual_manifest) {
            let expected_lines: BTreeSet<String> =
                expected.nodes().iter().map(ToString::to_string).collect();
            let actual_lines: BTreeSet<String> =
                actual.nodes().iter().map(ToString::to_string).collect();
            for line in actual_lines.difference(&expected_lines) {
                write!(f, "\nunexpected: {line}")?;
            }
            for line in expected_lines.difference(&actual_lines) {
                write!(f, "\nmissing: {line}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for DigestMismatch {}

/// An error returned by one of the [`Store`](crate::Store) operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Content does not hash to the digest it claims. Nothing was
    /// committed.
    #[error(transparent)]
    DigestMismatch(Box<DigestMismatch>),

    /// The commit target already exists. The desired implementation is
    /// already cached, so callers should treat this as success-equivalent.
    #[error("implementation {0} is already in the store")]
    AlreadyInStore(ManifestDigest),

    /// No implementation matching the digest exists in the store.
    #[error("implementation {0} was not found in the store")]
    NotFound(ManifestDigest),

    /// The supplied digest set has no populated slot to work with.
    #[error("no digest value available")]
    NoDigest,

    /// The store's filesystem rounds modification times more coarsely than
    /// one second, which would break digest-based change detection. The
    /// store is unusable for write operations.
    #[error("the filesystem at '{}' cannot store modification times at second resolution", path.display())]
    InsufficientTimestampResolution {
        /// The probed store root.
        path: PathBuf,
    },

    /// Access to a path was denied by the operating system.
    #[error("access to '{}' was denied", path.display())]
    PermissionDenied {
        /// The path access was denied to.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A manifest could not be generated, read or written.
    #[error(transparent)]
    Manifest(ManifestError),

    /// Cooperative cancellation was observed.
    #[error("operation was cancelled")]
    Cancelled,

    /// An underlying filesystem operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ManifestError> for StoreError {
    fn from(err: ManifestError) -> Self {
        // Cancellation is its own failure mode, not a manifest defect.
        match err {
            ManifestError::Cancelled => StoreError::Cancelled,
            other => StoreError::Manifest(other),
        }
    }
}

impl StoreError {
    /// Wraps an I/O error, pulling permission problems out into their own
    /// variant so callers can distinguish "may not" from "could not".
    pub(crate) fn from_io(path: &std::path::Path, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            StoreError::PermissionDenied {
                path: path.to_path_buf(),
                source: err,
            }
        } else {
            StoreError::Io(err)
        }
    }
}
