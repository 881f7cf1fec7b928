#![deny(missing_docs)]

//! A content-addressed cache of implementation directories.
//!
//! A [`Store`] manages one cache directory in which every committed entry is
//! an immutable directory tree named by the digest of its canonical
//! manifest. Content enters through a staging directory and is only renamed
//! to its final, digest-named location after the computed digest matches the
//! expected one; committed entries are write-protected and audited or
//! removed through the same digest machinery.
//!
//! The [`Store`] object itself is immutable; the mutable resource is the
//! directory tree it manages. All methods are synchronous and may be called
//! from multiple threads concurrently; only the existence-check plus rename
//! at the heart of the commit protocol is serialized, per store instance.

mod copy;
mod error;
mod extract;
mod optimise;
mod protect;
mod reporter;
mod store;
mod timestamp;

pub use depot_manifest::MANIFEST_FILE_NAME;

pub use error::{DigestMismatch, StoreError};
pub use extract::{ArchiveExtractor, ArchiveSource};
pub use reporter::{BatchPrompter, Prompter, Reporter};
pub use store::{Store, StoreEntry};
