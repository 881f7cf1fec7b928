//! Store-construction probe for filesystem timestamp resolution.
//!
//! Manifest digests include file modification times in whole seconds. A
//! filesystem that rounds mtimes more coarsely (classic FAT stores them in
//! 2-second steps) would make a freshly copied tree hash differently from
//! its source, so the store refuses to come up writable on such a
//! filesystem rather than produce spurious digest mismatches later.

use std::path::Path;

use filetime::FileTime;

use crate::StoreError;

/// An mtime with an odd number of seconds; survives only filesystems with
/// at-least-second resolution.
const PROBE_MTIME: i64 = 1_000_000_001;

/// Verifies that the filesystem holding `root` stores modification times
/// accurate to the second.
///
/// When the probe file cannot even be created because the root is read-only
/// to us, the check is skipped: a read-only store is never written, so the
/// precondition is moot.
pub(crate) fn probe_timestamp_resolution(root: &Path) -> Result<(), StoreError> {
    let probe = match tempfile::Builder::new()
        .prefix(".mtime-probe")
        .tempfile_in(root)
    {
        Ok(probe) => probe,
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::debug!(
                "store root {} is read-only, skipping timestamp resolution probe",
                root.display()
            );
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    filetime::set_file_mtime(probe.path(), FileTime::from_unix_time(PROBE_MTIME, 0))?;
    let written_back = FileTime::from_last_modification_time(&probe.path().metadata()?);

    if written_back.unix_seconds() != PROBE_MTIME {
        return Err(StoreError::InsufficientTimestampResolution {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::probe_timestamp_resolution;

    #[test]
    fn test_probe_passes_on_tempdir() {
        let temp_dir = tempfile::tempdir().unwrap();
        probe_timestamp_resolution(temp_dir.path()).unwrap();
        // The probe file cleans up after itself.
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
