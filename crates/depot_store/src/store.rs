use std::path::{Path, PathBuf};

use depot_digest::{DigestValue, ManifestDigest};
use depot_manifest::{Manifest, ManifestFormat, MANIFEST_FILE_NAME};
use fs_err as fs;
use parking_lot::Mutex;
use tempfile::TempDir;

use crate::{
    copy::copy_directory,
    protect::{disable_write_protection, enable_write_protection},
    timestamp::probe_timestamp_resolution,
    ArchiveExtractor, ArchiveSource, DigestMismatch, Prompter, Reporter, StoreError,
};

/// A cache directory holding implementations, each in its own sub-directory
/// named by its [`ManifestDigest`].
///
/// The struct itself is immutable and all methods take `&self`; it can be
/// shared freely between threads. The represented store data on disk is the
/// mutable resource, and the commit protocol keeps it consistent under
/// concurrent writers in this or other processes.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    /// Serializes only the exists-check plus rename pair of the commit
    /// protocol. Hashing, copying and extraction all run outside it.
    rename_lock: Mutex<()>,
}

/// One committed implementation, as reported by [`Store::entries`].
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// The digest the implementation is stored under.
    pub digest: ManifestDigest,
    /// Absolute path of the implementation directory.
    pub path: PathBuf,
    /// Total content size according to the persisted manifest, if that
    /// manifest was readable.
    pub size: Option<u64>,
}

impl Store {
    /// Opens the store at `path`, creating the directory if necessary.
    ///
    /// Fails with [`StoreError::InsufficientTimestampResolution`] if the
    /// underlying filesystem cannot store modification times accurate to
    /// the second, since manifest digests depend on them. The probe is
    /// skipped for roots we cannot write to.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|err| StoreError::from_io(&path, err))?;
        let path = fs::canonicalize(&path)?;
        probe_timestamp_resolution(&path)?;
        Ok(Self {
            path,
            rename_lock: Mutex::new(()),
        })
    }

    /// The store root directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Finds the stored digest value and directory for `digest`, probing
    /// its populated algorithm slots strongest-first.
    pub(crate) fn find(&self, digest: &ManifestDigest) -> Option<(DigestValue, PathBuf)> {
        digest.available_digests().into_iter().find_map(|value| {
            let path = self.path.join(value.to_string());
            path.is_dir().then_some((value, path))
        })
    }

    /// Whether an implementation matching any of the digest's populated
    /// algorithm slots is committed.
    ///
    /// An implementation committed under an older algorithm is still found
    /// by a caller whose digest populates a newer one, as long as one slot
    /// overlaps ([`ManifestDigest::matches`] semantics).
    pub fn contains(&self, digest: &ManifestDigest) -> bool {
        self.find(digest).is_some()
    }

    /// The directory of the implementation matching `digest`, if committed.
    pub fn get_path(&self, digest: &ManifestDigest) -> Option<PathBuf> {
        self.find(digest).map(|(_, path)| path)
    }

    /// Lists the digests of all committed implementations.
    ///
    /// Root sub-directories whose names do not parse as digests are not
    /// implementations and are silently excluded; see
    /// [`Store::list_temp`] for the complement.
    pub fn list(&self) -> Result<Vec<ManifestDigest>, StoreError> {
        let mut result = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(digest) = entry
                .file_name()
                .to_str()
                .and_then(|name| ManifestDigest::parse(name).ok())
            {
                result.push(digest);
            }
        }
        result.sort_by_key(|digest| digest.best().map(|best| best.to_string()));
        Ok(result)
    }

    /// Lists root sub-directories that are not implementations: orphaned
    /// staging directories from crashed or cancelled adds, eligible for
    /// cleanup.
    pub fn list_temp(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut result = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let is_digest = entry
                .file_name()
                .to_str()
                .is_some_and(|name| ManifestDigest::parse(name).is_ok());
            if !is_digest {
                result.push(entry.path());
            }
        }
        result.sort();
        Ok(result)
    }

    /// Lists all committed implementations together with their paths and
    /// manifest-reported sizes.
    pub fn entries(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let mut entries = Vec::new();
        for digest in self.list()? {
            let Some((stored, path)) = self.find(&digest) else {
                continue;
            };
            let size = Manifest::load(
                &path.join(MANIFEST_FILE_NAME),
                ManifestFormat::from_digest(&stored),
            )
            .ok()
            .map(|manifest| manifest.total_size());
            entries.push(StoreEntry { digest, path, size });
        }
        Ok(entries)
    }

    /// Deletes all orphaned staging directories, returning how many were
    /// removed.
    pub fn purge_temp(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for path in self.list_temp()? {
            if let Err(err) = disable_write_protection(&path) {
                tracing::warn!("failed to unprotect {} before deletion: {err}", path.display());
            }
            fs::remove_dir_all(&path).map_err(|err| StoreError::from_io(&path, err))?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Creates a fresh staging directory inside the store root. Keeping it
    /// on the same filesystem is what makes the final rename atomic.
    fn stage(&self) -> Result<TempDir, StoreError> {
        Ok(tempfile::Builder::new()
            .prefix(".stage-")
            .tempdir_in(&self.path)?)
    }

    /// Copies the directory `source` into the store under `digest`.
    ///
    /// The source is first copied into a staging directory inside the store
    /// (so nobody can manipulate it between hashing and commit), preserving
    /// modification times and permission bits, then verified and committed.
    /// The staging directory is deleted on every exit path. Returns the
    /// committed directory.
    pub fn add_directory(
        &self,
        source: &Path,
        digest: &ManifestDigest,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, StoreError> {
        if self.contains(digest) {
            return Err(StoreError::AlreadyInStore(digest.clone()));
        }

        let staging = self.stage()?;
        copy_directory(source, staging.path(), reporter)?;
        self.verify_and_add(&staging, digest, reporter)
    }

    /// Extracts `archives` over each other in listed order into a staging
    /// directory, then verifies and commits the result under `digest`.
    ///
    /// Later archives overwrite earlier ones, which is how layered
    /// patch-style implementations are assembled. The staging directory is
    /// deleted on every exit path. Returns the committed directory.
    pub fn add_archives(
        &self,
        archives: &[ArchiveSource],
        extractor: &dyn ArchiveExtractor,
        digest: &ManifestDigest,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, StoreError> {
        if self.contains(digest) {
            return Err(StoreError::AlreadyInStore(digest.clone()));
        }

        let staging = self.stage()?;
        for archive in archives {
            let target = match &archive.destination {
                Some(destination) => {
                    let target = staging.path().join(destination);
                    fs::create_dir_all(&target)?;
                    target
                }
                None => staging.path().to_path_buf(),
            };
            extractor.extract(archive, &target, reporter)?;
        }
        self.verify_and_add(&staging, digest, reporter)
    }

    /// The commit protocol: verify the staged directory against the digest
    /// it claims to be, then atomically move it to its final name.
    fn verify_and_add(
        &self,
        staging: &TempDir,
        expected: &ManifestDigest,
        reporter: &dyn Reporter,
    ) -> Result<PathBuf, StoreError> {
        let best = expected.best().ok_or(StoreError::NoDigest)?;
        let format = ManifestFormat::from_digest(&best);

        let manifest = Manifest::generate(staging.path(), format, reporter)?;
        let actual = manifest.digest();
        if actual != best {
            // A manifest shipped with the content describes what the
            // expected digest was derived from; keep it for diagnostics.
            let expected_manifest =
                Manifest::load(&staging.path().join(MANIFEST_FILE_NAME), format).ok();
            return Err(StoreError::DigestMismatch(Box::new(DigestMismatch {
                expected: best,
                actual,
                expected_manifest,
                actual_manifest: Some(manifest),
            })));
        }
        manifest.save(&staging.path().join(MANIFEST_FILE_NAME))?;

        let target = self.path.join(best.to_string());
        {
            let _guard = self.rename_lock.lock();
            if target.exists() {
                return Err(StoreError::AlreadyInStore(expected.clone()));
            }
            if let Err(err) = fs::rename(staging.path(), &target) {
                // The in-process lock cannot see other processes; the rename
                // primitive's destination-exists failure is the actual
                // cross-process arbiter.
                return if target.is_dir() {
                    Err(StoreError::AlreadyInStore(expected.clone()))
                } else {
                    Err(err.into())
                };
            }
        }

        if let Err(err) = enable_write_protection(&target) {
            tracing::warn!("failed to write-protect {}: {err}", target.display());
        }
        Ok(target)
    }

    /// Removes the implementation matching `digest` from the store.
    ///
    /// The entry is renamed away before the recursive delete starts, so it
    /// becomes invisible to [`Store::contains`]/[`Store::get_path`]
    /// immediately, however large the tree.
    pub fn remove(&self, digest: &ManifestDigest) -> Result<(), StoreError> {
        let path = self
            .get_path(digest)
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;

        disable_write_protection(&path).map_err(|err| StoreError::from_io(&path, err))?;

        let graveyard = tempfile::Builder::new()
            .prefix(".removing-")
            .tempdir_in(&self.path)?;
        fs::rename(&path, graveyard.path().join("doomed"))?;
        graveyard.close()?;
        Ok(())
    }

    /// Audits the implementation matching `digest` by regenerating its
    /// manifest and comparing digests. Returns whether the entry is intact.
    ///
    /// On mismatch the `prompter` is offered a delete-and-refetch cycle
    /// (batch default: keep). Write protection is re-applied afterwards in
    /// case it got lost along the way; failures there are not fatal.
    pub fn verify(
        &self,
        digest: &ManifestDigest,
        reporter: &dyn Reporter,
        prompter: &dyn Prompter,
    ) -> Result<bool, StoreError> {
        let (stored, path) = self
            .find(digest)
            .ok_or_else(|| StoreError::NotFound(digest.clone()))?;
        let format = ManifestFormat::from_digest(&stored);

        let manifest = Manifest::generate(&path, format, reporter)?;
        let actual = manifest.digest();
        let intact = actual == stored;
        if !intact {
            let mismatch = DigestMismatch {
                expected: stored.clone(),
                actual,
                expected_manifest: Manifest::load(&path.join(MANIFEST_FILE_NAME), format).ok(),
                actual_manifest: Some(manifest),
            };
            tracing::error!("{mismatch}");
            let question = format!(
                "implementation {stored} appears damaged; remove it from the store?"
            );
            if prompter.ask_yes_no(&question, false) {
                self.remove(digest)?;
                return Ok(false);
            }
        }

        if let Err(err) = enable_write_protection(&path) {
            tracing::warn!(
                "failed to re-apply write protection to {}: {err}",
                path.display()
            );
        }
        Ok(intact)
    }
}
