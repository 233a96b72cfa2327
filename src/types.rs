//! Core data types used throughout the relink library
//!
//! This module contains fundamental data structures that are shared across
//! different components of the library.
//!
//! ## Overview
//!
//! The types in this module represent:
//! - **File System State**: `FileMeta`, `FileRecord` - a file's observed
//!   identity and its persisted index row
//! - **Operations**: `DedupReport`, `SkippedFile` - results of a run
//! - **Progress**: `ProgressInfo` - callback payload for long operations

use crate::fingerprint::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Filesystem identity and metadata of one regular file, as observed by the
/// metadata prober at a single point in time.
///
/// Device and inode together identify the underlying file data; two paths
/// denote the same file iff both match. The pair is mutable state owned by
/// the operating system, not by this program, so it is only ever compared
/// against fresh observations, never trusted across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Device id of the filesystem holding the file
    pub device: u64,
    /// Inode number on that device
    pub inode: u64,
    /// File size in bytes
    pub size: u64,
    /// Last modification time, nanoseconds since the Unix epoch
    pub mtime_ns: i64,
    /// Number of directory entries pointing at this inode. A value above 1
    /// means the file already belongs to a hardlink set, possibly from a
    /// prior run or from outside this tool's control.
    pub nlink: u64,
}

/// One row of the persistent index.
///
/// Records are keyed by `path` (relative to the scanned root) rather than
/// by inode, because inode numbers are reused by the operating system when
/// files are deleted and new ones created; trusting inode as the cache key
/// would cause false cache hits.
///
/// The cached `fingerprint` is trustworthy iff the file's current
/// `(size, mtime_ns)` equals the stored pair. Any mismatch invalidates the
/// record and forces recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the scanned root; the record's identity
    pub path: PathBuf,
    /// File size in bytes, as last observed
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch, as last
    /// observed
    pub mtime_ns: i64,
    /// Inode number as last observed; refreshed after linking so the next
    /// run's cache hit reflects the new identity
    pub inode: u64,
    /// Cached content fingerprint
    pub fingerprint: Fingerprint,
}

/// A file the engine enumerated but could not process this run.
///
/// Skips are per-file and never abort the run; they are surfaced in the
/// [`DedupReport`] and logged at warn level.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    /// Path relative to the scanned root (absolute if the failure happened
    /// before the path could be relativized)
    pub path: PathBuf,
    /// Human-readable failure description
    pub reason: String,
}

/// Summary of a completed deduplication run
///
/// Returned by [`Deduper::run`](crate::engine::Deduper::run) and serialized
/// as JSON by the CLI's `--json` flag.
#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    /// Regular files enumerated by the scanner
    pub files_scanned: usize,
    /// Fingerprints computed by reading file content this run
    pub fingerprints_computed: usize,
    /// Files whose fingerprint was reused from the index without reading
    /// the file
    pub cache_hits: usize,
    /// Fingerprint groups that contained more than one member
    pub duplicate_groups: usize,
    /// Files rewritten as hardlinks to their group's canonical file
    pub files_linked: usize,
    /// Bytes of storage reclaimed by linking (counting only members whose
    /// inode had no other name left)
    pub bytes_reclaimed: u64,
    /// Files skipped with reasons
    pub skipped: Vec<SkippedFile>,
    /// Whether a corrupt index was discarded and rebuilt from scratch
    pub index_rebuilt: bool,
    /// Whether this was a dry run (nothing was modified)
    pub dry_run: bool,
    /// Wall-clock duration of the run in milliseconds
    pub duration_ms: u64,
    /// When the run finished
    pub completed_at: DateTime<Utc>,
}

impl DedupReport {
    /// Check whether the run changed (or, for a dry run, would change)
    /// anything on disk
    pub fn has_changes(&self) -> bool {
        self.files_linked > 0
    }

    /// Check whether any files were skipped
    pub fn has_skips(&self) -> bool {
        !self.skipped.is_empty()
    }
}

/// Progress information passed to callbacks during a run
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Current operation description
    pub operation: String,
    /// Items processed so far in this phase
    pub processed: usize,
    /// Total items in this phase, if known
    pub total: Option<usize>,
    /// Item currently being processed
    pub current: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_report() -> DedupReport {
        DedupReport {
            files_scanned: 0,
            fingerprints_computed: 0,
            cache_hits: 0,
            duplicate_groups: 0,
            files_linked: 0,
            bytes_reclaimed: 0,
            skipped: Vec::new(),
            index_rebuilt: false,
            dry_run: false,
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_report_flags() {
        let mut report = empty_report();
        assert!(!report.has_changes());
        assert!(!report.has_skips());

        report.files_linked = 2;
        report.skipped.push(SkippedFile {
            path: PathBuf::from("bad.bin"),
            reason: "permission denied".to_string(),
        });
        assert!(report.has_changes());
        assert!(report.has_skips());
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = empty_report();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"files_scanned\":0"));
        assert!(json.contains("\"dry_run\":false"));
    }
}
