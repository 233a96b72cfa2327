//! # Relink - Hardlink-based file deduplication
//!
//! A deduplication engine that finds files with identical content in a
//! directory tree and collapses them into hardlinks of a single underlying
//! inode, reclaiming disk space without deleting any logical file.
//!
//! ## Overview
//!
//! Relink walks a directory tree, fingerprints every regular file with a
//! streaming SHA-256 hash, groups byte-identical files, and rewrites the
//! redundant copies as hardlinks to one canonical file per group. A
//! per-directory index (`.relink-index`, a plain CSV file at the tree root)
//! records each known file's metadata and fingerprint so that repeated runs
//! are incremental:
//!
//! - Files whose size and modification time are unchanged are never re-read
//! - Files already linked together are left untouched
//! - Running the tool twice produces no observable change on the second run
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relink::DeduperBuilder;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut deduper = DeduperBuilder::new()
//!     .exclude_patterns(vec!["*.log".to_string()])
//!     .build(PathBuf::from("./photos"))?;
//!
//! let report = deduper.run()?;
//! println!(
//!     "linked {} files, reclaimed {} bytes",
//!     report.files_linked, report.bytes_reclaimed
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Concepts
//!
//! ### Fingerprints
//!
//! Two files are duplicates iff their complete byte content is identical.
//! Content identity is established by a SHA-256 fingerprint computed over
//! the full byte stream in bounded-size chunks, so memory use is independent
//! of file size.
//!
//! ### The index
//!
//! The index is a performance cache, not a source of truth: a cached
//! fingerprint is reused only while the file's current `(size, mtime)` still
//! equals the recorded pair, and losing the index merely costs a full
//! re-hash on the next run. It is keyed by path rather than inode because
//! inode numbers are recycled by the operating system; trusting them as a
//! cache key would produce false hits.
//!
//! ### Atomic replacement
//!
//! A duplicate is converted to a hardlink by creating the link under a
//! temporary name in the same directory and renaming it over the original
//! path. A crash between the two steps leaves either the original file or
//! the finished link visible, never a missing file.
//!
//! ### Safety boundaries
//!
//! Hardlinks cannot span filesystems, so duplicate groups are partitioned
//! by device id and members on different devices are never merged.
//! Concurrent runs over the same root are excluded by a lock file held for
//! the duration of the run.
//!
//! ## Module Organization
//!
//! - [`engine`]: the deduplication engine orchestrating a full run
//! - [`index`]: the persistent path-to-fingerprint index
//! - [`fingerprint`]: streaming content hashing
//! - [`scanner`]: deterministic directory tree enumeration
//! - [`probe`]: file metadata extraction (device, inode, size, mtime, nlink)
//! - [`types`]: shared data structures
//! - [`error`]: error types and handling

// Public API modules
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod index;
pub mod probe;
pub mod scanner;
pub mod types;

// Internal modules (not part of public API)
mod lock;

// Re-export main types for convenience
pub use engine::{Deduper, DeduperBuilder};
pub use error::{RelinkError, Result};
pub use fingerprint::{fingerprint_data, fingerprint_file, Fingerprint};
pub use index::Index;
pub use scanner::Scanner;
pub use types::*;

/// Every file relink creates inside the target tree carries this name
/// prefix, and the scanner skips anything that does.
pub const INTERNAL_FILE_PREFIX: &str = ".relink";
