use std::fmt::{Display, Formatter};

use crate::ManifestError;

/// One entry in a manifest, serialized as exactly one line.
///
/// The line formats are:
///
/// ```text
/// D /relative/path
/// F <digest> <mtime> <size> <name>
/// X <digest> <mtime> <size> <name>
/// S <digest> <size> <name>
/// ```
///
/// `name` is the last field and may contain spaces; directory paths are
/// `/`-separated and rooted at the implementation root, independent of the
/// platform the manifest was generated on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestNode {
    /// A directory. Listed before its children.
    Directory {
        /// Rooted `/`-separated path, e.g. `/lib/sub`.
        path: String,
    },

    /// A regular, non-executable file.
    File {
        /// Content hash in the manifest format's value encoding.
        digest: String,
        /// Last modification time in Unix seconds.
        mtime: i64,
        /// File size in bytes.
        size: u64,
        /// File name within the containing directory.
        name: String,
    },

    /// A regular file with the executable bit set.
    Executable {
        /// Content hash in the manifest format's value encoding.
        digest: String,
        /// Last modification time in Unix seconds.
        mtime: i64,
        /// File size in bytes.
        size: u64,
        /// File name within the containing directory.
        name: String,
    },

    /// A symbolic link. The digest is the hash of the link target string.
    Symlink {
        /// Hash of the link target.
        digest: String,
        /// Byte length of the link target.
        size: u64,
        /// Link name within the containing directory.
        name: String,
    },
}

impl ManifestNode {
    /// The name of this node within its containing directory, or the last
    /// path segment for directories.
    pub fn name(&self) -> &str {
        match self {
            ManifestNode::Directory { path } => path.rsplit('/').next().unwrap_or(path),
            ManifestNode::File { name, .. }
            | ManifestNode::Executable { name, .. }
            | ManifestNode::Symlink { name, .. } => name,
        }
    }

    /// Parses one manifest line.
    pub fn parse_line(line_number: usize, line: &str) -> Result<Self, ManifestError> {
        let malformed = || ManifestError::MalformedLine {
            line: line_number,
            text: line.to_string(),
        };

        let (tag, rest) = line.split_once(' ').ok_or_else(malformed)?;
        match tag {
            "D" => {
                if !rest.starts_with('/') {
                    return Err(malformed());
                }
                Ok(ManifestNode::Directory {
                    path: rest.to_string(),
                })
            }
            "F" | "X" => {
                let mut fields = rest.splitn(4, ' ');
                let digest = fields.next().ok_or_else(malformed)?.to_string();
                let mtime = fields
                    .next()
                    .and_then(|f| f.parse::<i64>().ok())
                    .ok_or_else(malformed)?;
                let size = fields
                    .next()
                    .and_then(|f| f.parse::<u64>().ok())
                    .ok_or_else(malformed)?;
                let name = fields.next().ok_or_else(malformed)?.to_string();
                if tag == "F" {
                    Ok(ManifestNode::File {
                        digest,
                        mtime,
                        size,
                        name,
                    })
                } else {
                    Ok(ManifestNode::Executable {
                        digest,
                        mtime,
                        size,
                        name,
                    })
                }
            }
            "S" => {
                let mut fields = rest.splitn(3, ' ');
                let digest = fields.next().ok_or_else(malformed)?.to_string();
                let size = fields
                    .next()
                    .and_then(|f| f.parse::<u64>().ok())
                    .ok_or_else(malformed)?;
                let name = fields.next().ok_or_else(malformed)?.to_string();
                Ok(ManifestNode::Symlink { digest, size, name })
            }
            _ => Err(malformed()),
        }
    }
}

impl Display for ManifestNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ManifestNode::Directory { path } => write!(f, "D {path}"),
            ManifestNode::File {
                digest,
                mtime,
                size,
                name,
            } => write!(f, "F {digest} {mtime} {size} {name}"),
            ManifestNode::Executable {
                digest,
                mtime,
                size,
                name,
            } => write!(f, "X {digest} {mtime} {size} {name}"),
            ManifestNode::Symlink { digest, size, name } => {
                write!(f, "S {digest} {size} {name}")
            }
        }
    }
}
