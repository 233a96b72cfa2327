//! File metadata probing
//!
//! Thin wrapper over `symlink_metadata` that classifies failures into the
//! library's error taxonomy and extracts the filesystem identity fields
//! (device, inode, link count) the engine reasons about. Symlinks are never
//! followed; anything that is not a regular file is rejected.

use crate::error::{RelinkError, Result};
use crate::types::FileMeta;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

/// Probe a path's metadata.
///
/// Fails with [`RelinkError::NotFound`], [`RelinkError::PermissionDenied`],
/// or [`RelinkError::NotRegularFile`]; all three are per-file and
/// recoverable. Directories, symlinks, and special files are rejected, the
/// engine skips them.
pub fn probe(path: &Path) -> Result<FileMeta> {
    let metadata = fs::symlink_metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => RelinkError::NotFound {
            path: path.to_path_buf(),
        },
        ErrorKind::PermissionDenied => RelinkError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => RelinkError::Io(e),
    })?;

    if !metadata.file_type().is_file() {
        return Err(RelinkError::NotRegularFile {
            path: path.to_path_buf(),
        });
    }

    let mtime_ns = mtime_nanos(metadata.modified()?);

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        Ok(FileMeta {
            device: metadata.dev(),
            inode: metadata.ino(),
            size: metadata.len(),
            mtime_ns,
            nlink: metadata.nlink(),
        })
    }

    #[cfg(not(unix))]
    {
        // Hardlink rewriting needs stable device/inode identity, which the
        // standard library only exposes on Unix.
        let _ = mtime_ns;
        Err(RelinkError::NotRegularFile {
            path: path.to_path_buf(),
        })
    }
}

/// Convert a modification time to nanoseconds since the Unix epoch.
///
/// This is the representation persisted in the index; it compares exactly
/// and round-trips through text without precision loss.
pub fn mtime_nanos(t: SystemTime) -> i64 {
    let dt: DateTime<Utc> = t.into();
    dt.timestamp_nanos_opt().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_probe_regular_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"hello").unwrap();

        let meta = probe(&path).unwrap();
        assert_eq!(meta.size, 5);
        assert_eq!(meta.nlink, 1);
        assert!(meta.inode != 0);
    }

    #[test]
    fn test_probe_missing() {
        let dir = TempDir::new().unwrap();
        let err = probe(&dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, RelinkError::NotFound { .. }));
    }

    #[test]
    fn test_probe_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let err = probe(dir.path()).unwrap_err();
        assert!(matches!(err, RelinkError::NotRegularFile { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_probe_symlink_rejected() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target");
        let link = dir.path().join("link");
        fs::write(&target, b"x").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let err = probe(&link).unwrap_err();
        assert!(matches!(err, RelinkError::NotRegularFile { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_probe_counts_links() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        fs::write(&a, b"x").unwrap();
        fs::hard_link(&a, &b).unwrap();

        let meta_a = probe(&a).unwrap();
        let meta_b = probe(&b).unwrap();
        assert_eq!(meta_a.nlink, 2);
        assert_eq!(meta_a.inode, meta_b.inode);
        assert_eq!(meta_a.device, meta_b.device);
    }

    #[test]
    fn test_mtime_nanos_tracks_filetime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(1_000_000, 500)).unwrap();

        let meta = probe(&path).unwrap();
        assert_eq!(meta.mtime_ns, 1_000_000 * 1_000_000_000 + 500);
    }
}
