//! Staging copy used by directory adds.
//!
//! The copy must preserve modification times and permission bits: both feed
//! into the manifest digest, so a copy that loses them would never verify
//! against the digest computed from the source tree.

use std::path::Path;

use filetime::FileTime;
use fs_err as fs;

use crate::{Reporter, StoreError};

/// Recursively copies the contents of `source` into the existing directory
/// `target`, preserving file mtimes and permissions.
pub(crate) fn copy_directory(
    source: &Path,
    target: &Path,
    reporter: &dyn Reporter,
) -> Result<(), StoreError> {
    for entry in fs::read_dir(source).map_err(|err| StoreError::from_io(source, err))? {
        if reporter.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let entry = entry?;
        let entry_path = entry.path();
        let target_path = target.join(entry.file_name());
        let metadata = fs::symlink_metadata(&entry_path)?;
        let file_type = metadata.file_type();

        if file_type.is_symlink() {
            copy_symlink(&entry_path, &target_path)?;
        } else if file_type.is_dir() {
            fs::create_dir(&target_path).map_err(|err| StoreError::from_io(&target_path, err))?;
            copy_directory(&entry_path, &target_path, reporter)?;
        } else if file_type.is_file() {
            // fs::copy carries the permission bits; the mtime needs help.
            let bytes = fs::copy(&entry_path, &target_path)
                .map_err(|err| StoreError::from_io(&entry_path, err))?;
            let mtime = FileTime::from_last_modification_time(&metadata);
            filetime::set_file_mtime(&target_path, mtime)?;
            reporter.on_progress(bytes);
        } else {
            return Err(depot_manifest::ManifestError::UnsupportedNodeKind { path: entry_path }.into());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, target: &Path) -> Result<(), StoreError> {
    let link_target = fs::read_link(source)?;
    std::os::unix::fs::symlink(link_target, target)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, _target: &Path) -> Result<(), StoreError> {
    Err(depot_manifest::ManifestError::UnsupportedNodeKind {
        path: source.to_path_buf(),
    }
    .into())
}

#[cfg(test)]
mod test {
    use super::copy_directory;
    use filetime::FileTime;

    #[test]
    fn test_copy_preserves_mtime() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let file = source.path().join("file");
        std::fs::write(&file, "data").unwrap();
        filetime::set_file_mtime(&file, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        copy_directory(source.path(), target.path(), &()).unwrap();

        let copied = std::fs::metadata(target.path().join("file")).unwrap();
        assert_eq!(
            FileTime::from_last_modification_time(&copied).unix_seconds(),
            1_700_000_000
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_exec_bit_and_symlinks() {
        use std::os::unix::fs::PermissionsExt;

        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let script = source.path().join("run.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::os::unix::fs::symlink("run.sh", source.path().join("link")).unwrap();

        copy_directory(source.path(), target.path(), &()).unwrap();

        let mode = std::fs::metadata(target.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o100, 0o100);
        let link = target.path().join("link");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_link(&link).unwrap().to_str(), Some("run.sh"));
    }
}
