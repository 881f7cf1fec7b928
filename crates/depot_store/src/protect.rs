//! Recursive write protection for committed implementations.
//!
//! Committed entries are marked read-only to deter accidental or hostile
//! modification. Protection is a deterrent, not the integrity guarantee:
//! digest verification still governs correctness, which is why callers
//! downgrade protection failures to warnings in most paths.

use std::path::Path;

use fs_err as fs;

/// Marks `path` and everything beneath it read-only.
pub(crate) fn enable_write_protection(path: &Path) -> std::io::Result<()> {
    set_write_protection(path, true)
}

/// Restores write permission on `path` and everything beneath it.
pub(crate) fn disable_write_protection(path: &Path) -> std::io::Result<()> {
    set_write_protection(path, false)
}

fn set_write_protection(path: &Path, protect: bool) -> std::io::Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    // Symlinks carry no permissions of their own worth toggling.
    if metadata.file_type().is_symlink() {
        return Ok(());
    }

    if metadata.is_dir() {
        for entry in fs::read_dir(path)? {
            set_write_protection(&entry?.path(), protect)?;
        }
    }

    let mut permissions = metadata.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = permissions.mode();
        permissions.set_mode(if protect { mode & !0o222 } else { mode | 0o200 });
    }
    #[cfg(not(unix))]
    {
        // Read-only directories have no meaning on non-Unix platforms.
        if !metadata.is_dir() {
            permissions.set_readonly(protect);
        }
    }
    fs::set_permissions(path, permissions)?;
    Ok(())
}
