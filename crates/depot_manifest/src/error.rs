use std::path::PathBuf;

/// An error produced while generating, reading or writing a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The tree contains a filesystem node the manifest model cannot
    /// represent (device file, socket, FIFO, ...).
    #[error("unsupported filesystem node kind at '{}'", path.display())]
    UnsupportedNodeKind {
        /// Path of the offending node.
        path: PathBuf,
    },

    /// A file name could not be interpreted as unicode.
    #[error("file name at '{}' is not valid unicode", path.display())]
    NonUnicodeName {
        /// Path of the offending node.
        path: PathBuf,
    },

    /// A file name contains characters the line format cannot carry.
    #[error("file name '{name}' cannot be represented in a manifest")]
    UnrepresentableName {
        /// The offending file name.
        name: String,
    },

    /// A persisted manifest file contains a line that does not parse.
    #[error("malformed manifest line {line}: '{text}'")]
    MalformedLine {
        /// 1-based line number.
        line: usize,
        /// The offending line.
        text: String,
    },

    /// Cooperative cancellation was observed during generation.
    #[error("operation was cancelled")]
    Cancelled,

    /// An underlying I/O operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
