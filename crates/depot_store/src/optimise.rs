//! Storage deduplication across committed implementations.
//!
//! Different implementations frequently ship identical files (unchanged
//! assets across versions, repeated license texts). [`Store::optimise`]
//! finds them through the persisted manifests (no rehashing) and replaces
//! every duplicate with a hardlink to the first occurrence.
//!
//! The replacement order is the load-bearing part: the new link is created
//! at a temporary name first and then renamed over the duplicate, so there
//! is never a moment where the duplicate's path is missing. Content is
//! never altered, only inode sharing.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use depot_manifest::{Manifest, ManifestFormat, ManifestNode, MANIFEST_FILE_NAME};

use crate::{
    protect::{disable_write_protection, enable_write_protection},
    Reporter, Store, StoreError,
};

/// Two files are considered identical when size, modification time, hash
/// format and content hash all agree. Matching on the manifest data alone
/// is what makes optimisation cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    size: u64,
    mtime: i64,
    format: ManifestFormat,
    digest: String,
}

/// The first occurrence of a content key, which all later duplicates are
/// linked to.
struct Canonical {
    path: PathBuf,
    root: PathBuf,
}

/// Tracks which implementation roots had their write protection dropped,
/// restoring each exactly once, even when linking fails partway through.
struct UnprotectedRoots {
    roots: Vec<PathBuf>,
}

impl UnprotectedRoots {
    fn new() -> Self {
        Self { roots: Vec::new() }
    }

    fn unlock(&mut self, root: &Path) -> Result<(), StoreError> {
        if self.roots.iter().any(|unlocked| unlocked == root) {
            return Ok(());
        }
        disable_write_protection(root).map_err(|err| StoreError::from_io(root, err))?;
        self.roots.push(root.to_path_buf());
        Ok(())
    }
}

impl Drop for UnprotectedRoots {
    fn drop(&mut self) {
        for root in &self.roots {
            if let Err(err) = enable_write_protection(root) {
                tracing::warn!(
                    "failed to restore write protection on {}: {err}",
                    root.display()
                );
            }
        }
    }
}

impl Store {
    /// Deduplicates identical files across all committed implementations by
    /// hardlinking, returning the number of bytes saved.
    ///
    /// Files are matched on `(size, mtime, format, content hash)` read from
    /// each implementation's persisted manifest. Zero-length files are
    /// skipped, there being no space to save. The saving counts the size of every
    /// occurrence after the first in each group that was not already
    /// linked.
    pub fn optimise(&self, reporter: &dyn Reporter) -> Result<u64, StoreError> {
        let mut first_seen: HashMap<DedupKey, Canonical> = HashMap::new();
        let mut saved = 0;
        let mut unprotected = UnprotectedRoots::new();

        for digest in self.list()? {
            if reporter.is_cancelled() {
                return Err(StoreError::Cancelled);
            }
            let Some((stored, root)) = self.find(&digest) else {
                continue;
            };
            let format = ManifestFormat::from_digest(&stored);
            let manifest = match Manifest::load(&root.join(MANIFEST_FILE_NAME), format) {
                Ok(manifest) => manifest,
                Err(err) => {
                    tracing::warn!("skipping {stored} during optimisation: {err}");
                    continue;
                }
            };

            let mut current_dir = root.clone();
            for node in manifest.nodes() {
                match node {
                    ManifestNode::Directory { path } => {
                        current_dir = root.join(path.trim_start_matches('/'));
                    }
                    ManifestNode::File {
                        digest: content,
                        mtime,
                        size,
                        name,
                    }
                    | ManifestNode::Executable {
                        digest: content,
                        mtime,
                        size,
                        name,
                    } => {
                        if *size == 0 {
                            continue;
                        }
                        let file_path = current_dir.join(name);
                        let key = DedupKey {
                            size: *size,
                            mtime: *mtime,
                            format,
                            digest: content.clone(),
                        };
                        match first_seen.get(&key) {
                            Some(canonical) => {
                                if self.link_duplicate(
                                    canonical,
                                    &file_path,
                                    &root,
                                    &mut unprotected,
                                )? {
                                    saved += *size;
                                }
                            }
                            None => {
                                first_seen.insert(
                                    key,
                                    Canonical {
                                        path: file_path,
                                        root: root.clone(),
                                    },
                                );
                            }
                        }
                        reporter.on_progress(*size);
                    }
                    ManifestNode::Symlink { .. } => {}
                }
            }
        }
        Ok(saved)
    }

    /// Replaces `duplicate` with a hardlink to the canonical occurrence.
    /// Returns false if the two are already the same inode.
    fn link_duplicate(
        &self,
        canonical: &Canonical,
        duplicate: &Path,
        duplicate_root: &Path,
        unprotected: &mut UnprotectedRoots,
    ) -> Result<bool, StoreError> {
        if already_hardlinked(&canonical.path, duplicate)? {
            return Ok(false);
        }

        unprotected.unlock(&canonical.root)?;
        unprotected.unlock(duplicate_root)?;

        // Link under a temporary name first, then rename over the
        // duplicate. Never delete-then-link: that would open a window
        // where the duplicate's path is missing.
        let link = tempfile::Builder::new()
            .prefix(".link-")
            .make_in(self.path(), |path| {
                std::fs::hard_link(&canonical.path, path)
            })?;
        link.into_temp_path()
            .persist(duplicate)
            .map_err(|err| StoreError::Io(err.error))?;
        Ok(true)
    }
}

#[cfg(unix)]
fn already_hardlinked(a: &Path, b: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;
    let a = fs_err::metadata(a)?;
    let b = fs_err::metadata(b)?;
    Ok(a.dev() == b.dev() && a.ino() == b.ino())
}

#[cfg(not(unix))]
fn already_hardlinked(_a: &Path, _b: &Path) -> std::io::Result<bool> {
    // Without inode identity there is no cheap linkedness check; linking
    // again is harmless, merely redundant.
    Ok(false)
}
