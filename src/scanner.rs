//! Directory tree enumeration
//!
//! The scanner walks the target root recursively and yields the
//! root-relative paths of every regular file, in a deterministic lexical
//! order so canonical-file selection is stable from run to run. Symlinked
//! directories are not descended (no infinite recursion, no deduplicating
//! outside the intended filesystem), non-regular entries are skipped, and
//! every name carrying the `.relink` prefix (index, temp, lock files) is
//! excluded.
//!
//! The sequence is lazy and restartable: each run re-walks the tree from
//! scratch, there is no persisted cursor.

use crate::error::{RelinkError, Result};
use crate::INTERNAL_FILE_PREFIX;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Tree scanner for a single root directory.
///
/// Configured builder-style:
///
/// ```rust,no_run
/// use relink::Scanner;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let scanner = Scanner::new("./photos")
///     .with_excludes(vec!["*.tmp".to_string(), "cache/**".to_string()]);
/// for path in scanner.scan()? {
///     println!("{}", path?.display());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Scanner {
    root: PathBuf,
    excludes: Vec<String>,
}

impl Scanner {
    /// Create a scanner for `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Scanner {
            root: root.into(),
            excludes: Vec::new(),
        }
    }

    /// Set glob patterns for paths to exclude, matched against the
    /// root-relative path. A pattern matching a directory prunes its whole
    /// subtree.
    pub fn with_excludes(mut self, patterns: Vec<String>) -> Self {
        self.excludes = patterns;
        self
    }

    /// Start a scan.
    ///
    /// Fails with [`RelinkError::InvalidPattern`] if an exclude pattern
    /// does not parse; everything else is reported per entry through the
    /// iterator.
    pub fn scan(&self) -> Result<ScanIter> {
        let excludes = if self.excludes.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.excludes {
                let glob = Glob::new(pattern).map_err(|e| RelinkError::InvalidPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                builder.add(glob);
            }
            Some(builder.build().map_err(|e| RelinkError::InvalidPattern {
                pattern: self.excludes.join(", "),
                reason: e.to_string(),
            })?)
        };

        Ok(ScanIter {
            inner: WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
            root: self.root.clone(),
            excludes,
        })
    }
}

/// Lazy iterator over the regular files of one scan, yielding
/// root-relative paths in lexical order
#[derive(Debug)]
pub struct ScanIter {
    inner: walkdir::IntoIter,
    root: PathBuf,
    excludes: Option<GlobSet>,
}

impl ScanIter {
    fn is_excluded(&self, relative: &Path) -> bool {
        self.excludes
            .as_ref()
            .is_some_and(|set| set.is_match(relative))
    }
}

impl Iterator for ScanIter {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };

            // The root itself has no relative path
            let relative = match entry.path().strip_prefix(&self.root) {
                Ok(rel) if !rel.as_os_str().is_empty() => rel.to_path_buf(),
                _ => continue,
            };

            if entry.file_type().is_dir() {
                if self.is_excluded(&relative) {
                    self.inner.skip_current_dir();
                }
                continue;
            }

            // Symlinks and special files are not regular files; with
            // follow_links off a symlink never reports as one
            if !entry.file_type().is_file() {
                continue;
            }

            if entry
                .file_name()
                .to_string_lossy()
                .starts_with(INTERNAL_FILE_PREFIX)
            {
                continue;
            }

            if self.is_excluded(&relative) {
                continue;
            }

            return Some(Ok(relative));
        }
    }
}
