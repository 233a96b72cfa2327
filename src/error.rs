//! Error types for the relink library
//!
//! This module defines all error types that can occur during deduplication.
//! The taxonomy distinguishes per-file errors, which the engine records and
//! skips so one bad file never aborts a run, from run-level errors, which
//! terminate the run.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the relink library
pub type Result<T> = std::result::Result<T, RelinkError>;

/// Main error type for all relink operations
#[derive(Debug, Error)]
pub enum RelinkError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal error from the walkdir crate
    #[error("walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Path does not exist
    #[error("not found: {path:?}")]
    NotFound {
        /// Path that could not be found
        path: PathBuf,
    },

    /// Permission denied for a file operation
    #[error("permission denied: {path:?}")]
    PermissionDenied {
        /// Path where permission was denied
        path: PathBuf,
    },

    /// Entry is a directory, symlink, or special file
    #[error("not a regular file: {path:?}")]
    NotRegularFile {
        /// Path of the non-regular entry
        path: PathBuf,
    },

    /// I/O failure partway through fingerprinting; no partial digest is
    /// ever returned
    #[error("read failed while fingerprinting {path:?}")]
    ReadError {
        /// File being fingerprinted
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Path contains bytes that are not valid UTF-8 and cannot be recorded
    /// in the index
    #[error("path is not valid UTF-8: {path:?}")]
    NonUtf8Path {
        /// The offending path
        path: PathBuf,
    },

    /// The index file exists but could not be parsed
    #[error("corrupt index {path:?}: {reason}")]
    CorruptIndex {
        /// Path of the index file
        path: PathBuf,
        /// What failed to parse
        reason: String,
    },

    /// Target of a run is missing or not a directory
    #[error("target is not a directory: {path:?}")]
    RootNotDirectory {
        /// The rejected target path
        path: PathBuf,
    },

    /// Another run holds the exclusive lock for this root
    #[error("another relink run is active (lock file {path:?} exists)")]
    AlreadyRunning {
        /// Path of the lock file
        path: PathBuf,
    },

    /// A group member landed on a different device than its canonical file.
    /// Device partitioning makes this unreachable; seeing it means an
    /// internal invariant was violated, so the run aborts.
    #[error(
        "cross-device link attempted: {path:?} is on device {found}, group is on device {expected}"
    )]
    CrossDeviceLink {
        /// Member that would have been linked
        path: PathBuf,
        /// Device id of the group
        expected: u64,
        /// Device id of the member
        found: u64,
    },

    /// Creating the temporary hardlink failed; the original file is intact
    #[error("failed to link {path:?} to canonical {canonical:?}")]
    LinkFailed {
        /// Member that was being replaced
        path: PathBuf,
        /// Canonical file of the group
        canonical: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Renaming the temporary hardlink over the original failed; the
    /// original file is intact and the temporary link has been removed
    #[error("failed to rename {from:?} over {to:?}")]
    RenameFailed {
        /// Temporary link path
        from: PathBuf,
        /// Original member path
        to: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// An exclude pattern did not parse as a glob
    #[error("invalid exclude pattern {pattern:?}: {reason}")]
    InvalidPattern {
        /// The rejected pattern
        pattern: String,
        /// Parser message
        reason: String,
    },

    /// Thread pool construction error
    #[error("thread pool error: {0}")]
    ThreadPool(String),
}

impl RelinkError {
    /// Create a corrupt-index error with a custom reason
    pub fn corrupt_index(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RelinkError::CorruptIndex {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Check whether this error is recoverable within a run.
    ///
    /// Recoverable errors affect a single file; the engine records them and
    /// continues with the remaining files. Everything else is run-level.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RelinkError::NotFound { .. }
                | RelinkError::PermissionDenied { .. }
                | RelinkError::NotRegularFile { .. }
                | RelinkError::ReadError { .. }
                | RelinkError::NonUtf8Path { .. }
                | RelinkError::LinkFailed { .. }
                | RelinkError::RenameFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_display() {
        let err = RelinkError::NotFound {
            path: PathBuf::from("/tmp/missing"),
        };
        assert_eq!(err.to_string(), "not found: \"/tmp/missing\"");
    }

    #[test]
    fn test_error_recoverable() {
        assert!(RelinkError::PermissionDenied {
            path: PathBuf::from("f"),
        }
        .is_recoverable());
        assert!(RelinkError::ReadError {
            path: PathBuf::from("f"),
            source: std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof"),
        }
        .is_recoverable());
        assert!(!RelinkError::CorruptIndex {
            path: PathBuf::from(".relink-index"),
            reason: "bad row".to_string(),
        }
        .is_recoverable());
        assert!(!RelinkError::AlreadyRunning {
            path: PathBuf::from(".relink-lock"),
        }
        .is_recoverable());
    }

    #[test]
    fn test_cross_device_is_not_recoverable() {
        let err = RelinkError::CrossDeviceLink {
            path: PathBuf::from("b"),
            expected: 1,
            found: 2,
        };
        assert!(!err.is_recoverable());
    }
}
