use std::path::{Path, PathBuf};

use crate::{Reporter, StoreError};

/// Describes one archive that contributes content to an implementation.
///
/// Implementations can be layered: the store extracts several archives over
/// the same staging directory in listed order, later archives overwriting
/// earlier ones (patch-style releases).
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    /// Path of the archive file on the local filesystem.
    pub path: PathBuf,
    /// MIME type identifying the archive format, if known.
    pub mime_type: Option<String>,
    /// Number of bytes to skip at the start of the file (self-extracting
    /// headers and similar).
    pub start_offset: u64,
    /// Subdirectory within the archive to extract; everything else is
    /// ignored.
    pub subdir: Option<String>,
    /// Subdirectory below the implementation root to extract into.
    pub destination: Option<String>,
}

impl ArchiveSource {
    /// Creates a source covering the whole archive at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mime_type: None,
            start_offset: 0,
            subdir: None,
            destination: None,
        }
    }
}

/// Collaborator that unpacks archives into a staging directory.
///
/// Archive-format handling lives outside the store; the store only
/// dictates where content lands and verifies the result afterwards. The
/// extractor must honor [`ArchiveSource::subdir`] and
/// [`ArchiveSource::start_offset`]; `destination` is resolved by the store
/// before calling.
pub trait ArchiveExtractor: Send + Sync {
    /// Extracts `archive` into `target`, which already exists.
    fn extract(
        &self,
        archive: &ArchiveSource,
        target: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), StoreError>;
}
