use std::path::Path;

use depot_digest::DigestValue;
use filetime::FileTime;
use fs_err as fs;

use crate::{ManifestError, ManifestFormat, ManifestNode, Reporter, MANIFEST_FILE_NAME};

/// A canonical listing of a directory tree.
///
/// Nodes appear in a depth-first traversal with each directory's entries
/// sorted by name in ordinal byte order and every directory listed before
/// its children. This order is part of the digest: the serialized text form
/// of an unmodified tree is bit-identical across runs and platforms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    format: ManifestFormat,
    nodes: Vec<ManifestNode>,
}

impl Manifest {
    /// Generates a manifest by walking `root`, hashing every regular file's
    /// contents and every symlink's target string with the format's
    /// algorithm.
    ///
    /// The `.manifest` file at the top level is excluded so that a committed
    /// implementation still matches the digest it was committed under.
    /// Cancellation is polled per node; hashed bytes are reported to
    /// `reporter` per file.
    pub fn generate(
        root: &Path,
        format: ManifestFormat,
        reporter: &dyn Reporter,
    ) -> Result<Self, ManifestError> {
        let mut nodes = Vec::new();
        generate_directory(root, "", format, reporter, &mut nodes)?;
        Ok(Self { format, nodes })
    }

    /// The format the manifest was generated or loaded with.
    pub fn format(&self) -> ManifestFormat {
        self.format
    }

    /// The nodes in canonical order.
    pub fn nodes(&self) -> &[ManifestNode] {
        &self.nodes
    }

    /// The canonical text form: one node per line, `\n` separated, with a
    /// trailing newline.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for node in &self.nodes {
            text.push_str(&node.to_string());
            text.push('\n');
        }
        text
    }

    /// The digest of the canonical text form, in the manifest's format.
    /// This value is the identity of the whole tree.
    pub fn digest(&self) -> DigestValue {
        self.format.digest_of_text(&self.to_text())
    }

    /// The sum of all content sizes (files, executables and symlink
    /// targets). Display value, not part of any integrity check.
    pub fn total_size(&self) -> u64 {
        self.nodes
            .iter()
            .map(|node| match node {
                ManifestNode::Directory { .. } => 0,
                ManifestNode::File { size, .. }
                | ManifestNode::Executable { size, .. }
                | ManifestNode::Symlink { size, .. } => *size,
            })
            .sum()
    }

    /// Writes the canonical text form to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        fs::write(path, self.to_text())?;
        Ok(())
    }

    /// Reads a manifest back from its persisted text form.
    ///
    /// The format cannot be recovered from the text itself and must be
    /// supplied, normally derived from the digest the file sits under.
    pub fn load(path: &Path, format: ManifestFormat) -> Result<Self, ManifestError> {
        let text = fs::read_to_string(path)?;
        let mut nodes = Vec::new();
        for (index, line) in text.lines().enumerate() {
            nodes.push(ManifestNode::parse_line(index + 1, line)?);
        }
        Ok(Self { format, nodes })
    }
}

fn generate_directory(
    dir: &Path,
    dir_rel: &str,
    format: ManifestFormat,
    reporter: &dyn Reporter,
    nodes: &mut Vec<ManifestNode>,
) -> Result<(), ManifestError> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    // Ordinal byte order of the names; the canonical node order depends on it.
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        if reporter.is_cancelled() {
            return Err(ManifestError::Cancelled);
        }

        let path = entry.path();
        let name = entry
            .file_name()
            .into_string()
            .map_err(|_| ManifestError::NonUnicodeName { path: path.clone() })?;
        if dir_rel.is_empty() && name == MANIFEST_FILE_NAME {
            continue;
        }
        if name.contains('\n') {
            return Err(ManifestError::UnrepresentableName { name });
        }

        let metadata = fs::symlink_metadata(&path)?;
        let file_type = metadata.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let target = target
                .to_str()
                .ok_or_else(|| ManifestError::NonUnicodeName { path: path.clone() })?;
            nodes.push(ManifestNode::Symlink {
                digest: format.algorithm().hash_bytes(target.as_bytes()),
                size: target.len() as u64,
                name,
            });
        } else if file_type.is_dir() {
            let sub_rel = format!("{dir_rel}/{name}");
            nodes.push(ManifestNode::Directory {
                path: sub_rel.clone(),
            });
            generate_directory(&path, &sub_rel, format, reporter, nodes)?;
        } else if file_type.is_file() {
            let digest = format.algorithm().hash_file(&path)?;
            let size = metadata.len();
            reporter.on_progress(size);
            let mtime = FileTime::from_last_modification_time(&metadata).unix_seconds();
            if is_executable(&metadata) {
                nodes.push(ManifestNode::Executable {
                    digest,
                    mtime,
                    size,
                    name,
                });
            } else {
                nodes.push(ManifestNode::File {
                    digest,
                    mtime,
                    size,
                    name,
                });
            }
        } else {
            return Err(ManifestError::UnsupportedNodeKind { path });
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod test {
    use super::Manifest;
    use crate::{ManifestError, ManifestFormat, ManifestNode, Reporter, MANIFEST_FILE_NAME};
    use assert_matches::assert_matches;
    use depot_digest::HashAlgorithm;
    use filetime::FileTime;
    use std::path::Path;

    fn format() -> ManifestFormat {
        ManifestFormat::new(HashAlgorithm::Sha256)
    }

    /// Writes a file and pins its mtime so digests are reproducible.
    fn write_file(dir: &Path, name: &str, contents: &str, mtime: i64) {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }

    #[test]
    fn test_golden_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "hello", "hello world", 1_700_000_000);
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        write_file(&temp_dir.path().join("sub"), "inner", "x", 1_700_000_001);

        let manifest = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        let hello_digest = HashAlgorithm::Sha256.hash_bytes(b"hello world");
        let inner_digest = HashAlgorithm::Sha256.hash_bytes(b"x");
        assert_eq!(
            manifest.to_text(),
            format!(
                "F {hello_digest} 1700000000 11 hello\nD /sub\nF {inner_digest} 1700000001 1 inner\n"
            )
        );
    }

    #[test]
    fn test_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "a", "first", 1_700_000_000);
        write_file(temp_dir.path(), "b with spaces", "second", 1_700_000_000);
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        write_file(&temp_dir.path().join("sub"), "c", "third", 1_700_000_002);

        let generated = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        let manifest_path = temp_dir.path().join(MANIFEST_FILE_NAME);
        generated.save(&manifest_path).unwrap();
        let loaded = Manifest::load(&manifest_path, format()).unwrap();

        assert_eq!(loaded, generated);
        assert_eq!(loaded.digest(), generated.digest());
    }

    #[test]
    fn test_determinism() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "a", "data", 1_700_000_000);

        let first = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        let second = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        assert_eq!(first.digest().to_string(), second.digest().to_string());
    }

    #[test]
    fn test_manifest_file_excluded_at_top_level_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), MANIFEST_FILE_NAME, "old listing", 1);
        std::fs::create_dir(temp_dir.path().join("sub")).unwrap();
        write_file(&temp_dir.path().join("sub"), MANIFEST_FILE_NAME, "data", 1);

        let manifest = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        let names: Vec<_> = manifest.nodes().iter().map(ManifestNode::name).collect();
        assert_eq!(names, ["sub", MANIFEST_FILE_NAME]);
    }

    #[test]
    fn test_sorted_interleaved_traversal() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "zz", "1", 1);
        write_file(temp_dir.path(), "aa", "2", 1);
        std::fs::create_dir(temp_dir.path().join("mm")).unwrap();
        write_file(&temp_dir.path().join("mm"), "child", "3", 1);

        let manifest = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        let names: Vec<_> = manifest.nodes().iter().map(ManifestNode::name).collect();
        // `mm` sorts between the files and is followed by its child.
        assert_eq!(names, ["aa", "mm", "child", "zz"]);
    }

    #[test]
    fn test_total_size() {
        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "a", "12345", 1);
        write_file(temp_dir.path(), "b", "678", 1);

        let manifest = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        assert_eq!(manifest.total_size(), 8);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_and_symlink_nodes() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "run.sh", "#!/bin/sh\n", 1_700_000_000);
        let script = temp_dir.path().join("run.sh");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        filetime::set_file_mtime(&script, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();
        std::os::unix::fs::symlink("run.sh", temp_dir.path().join("link")).unwrap();

        let manifest = Manifest::generate(temp_dir.path(), format(), &()).unwrap();
        assert_matches!(
            &manifest.nodes()[0],
            ManifestNode::Symlink { size: 6, name, digest }
                if name == "link" && *digest == HashAlgorithm::Sha256.hash_bytes(b"run.sh")
        );
        assert_matches!(
            &manifest.nodes()[1],
            ManifestNode::Executable { name, .. } if name == "run.sh"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unsupported_node_kind() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::os::unix::net::UnixListener::bind(temp_dir.path().join("sock")).unwrap();

        assert_matches!(
            Manifest::generate(temp_dir.path(), format(), &()),
            Err(ManifestError::UnsupportedNodeKind { path }) if path.ends_with("sock")
        );
    }

    #[test]
    fn test_cancellation() {
        struct CancelImmediately;
        impl Reporter for CancelImmediately {
            fn is_cancelled(&self) -> bool {
                true
            }
        }

        let temp_dir = tempfile::tempdir().unwrap();
        write_file(temp_dir.path(), "a", "data", 1);

        assert_matches!(
            Manifest::generate(temp_dir.path(), format(), &CancelImmediately),
            Err(ManifestError::Cancelled)
        );
    }

    #[test]
    fn test_load_rejects_malformed_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(MANIFEST_FILE_NAME);
        std::fs::write(&path, "F abc 1 2 ok\ngarbage\n").unwrap();

        assert_matches!(
            Manifest::load(&path, format()),
            Err(ManifestError::MalformedLine { line: 2, .. })
        );
    }
}
