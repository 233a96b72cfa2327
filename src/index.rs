//! Persistent fingerprint index
//!
//! This module provides the [`Index`], a per-directory table mapping each
//! tracked file's path to its last-observed metadata and content
//! fingerprint. The index is what makes repeated runs incremental: a file
//! whose `(size, mtime)` is unchanged gets its fingerprint from here
//! instead of being re-read.
//!
//! ## On-disk format
//!
//! The index lives in a hidden file `.relink-index` at the root of the
//! scanned tree, as plain CSV with a header row:
//!
//! ```text
//! path,size,mtime_ns,inode,fingerprint
//! a.txt,6,1712345678000000000,131212,2cf24db...
//! sub/b.txt,6,1712345678000000000,131212,2cf24db...
//! ```
//!
//! Rows are kept sorted by path, integers round-trip exactly, and saving
//! rewrites the whole table, so loading a just-saved index and re-saving it
//! without any filesystem change produces byte-identical content. The file
//! is deliberately human-inspectable.
//!
//! ## Consistency rules
//!
//! The index is a performance cache, not a source of truth. A missing or
//! empty file yields an empty index; a file that exists but does not parse
//! fails with [`RelinkError::CorruptIndex`], and the engine's policy is to
//! rebuild from scratch rather than abort. Saves are atomic: the table is
//! written to a temporary name and renamed over the old file, so a crash
//! mid-write never leaves a truncated index visible to the next run.

use crate::error::{RelinkError, Result};
use crate::fingerprint::Fingerprint;
use crate::types::FileRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// File name of the persistent index, relative to the scanned root
pub const INDEX_FILE_NAME: &str = ".relink-index";

/// Temporary name the index is written to before the atomic rename
const INDEX_TMP_NAME: &str = ".relink-index.tmp";

/// Expected header row; must match the field order of [`IndexRow`]
const HEADER: [&str; 5] = ["path", "size", "mtime_ns", "inode", "fingerprint"];

/// One CSV row; the wire form of a [`FileRecord`]
#[derive(Debug, Serialize, Deserialize)]
struct IndexRow {
    path: String,
    size: u64,
    mtime_ns: i64,
    inode: u64,
    fingerprint: String,
}

/// The persistent path-to-fingerprint index of one directory tree.
///
/// Exclusively owned by the engine for the duration of a run; concurrent
/// runs over the same root are excluded by the run lock, so no two
/// processes ever hold the same index.
#[derive(Debug)]
pub struct Index {
    /// Root of the tree this index describes
    root: PathBuf,
    /// Records keyed by root-relative path; sorted keys give the
    /// deterministic row order the round-trip guarantee depends on
    records: BTreeMap<PathBuf, FileRecord>,
    /// Whether the in-memory table differs from the file on disk
    dirty: bool,
}

impl Index {
    /// Create an empty index for `root` without touching the disk
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Index {
            root: root.into(),
            records: BTreeMap::new(),
            dirty: false,
        }
    }

    /// Load the index for `root`.
    ///
    /// A missing index file is not an error and yields an empty index. A
    /// file that exists but cannot be parsed fails with
    /// [`RelinkError::CorruptIndex`] carrying the offending row.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let path = root.join(INDEX_FILE_NAME);

        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no index at {:?}, starting empty", path);
                return Ok(Index::empty(root));
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = BTreeMap::new();
        let mut reader = csv::Reader::from_reader(file);

        // An empty file is an empty index; any other header shape means
        // the file is not an index we wrote
        let headers = reader
            .headers()
            .map_err(|e| RelinkError::corrupt_index(&path, format!("header: {}", e)))?;
        if headers.len() > 0 && headers.iter().ne(HEADER) {
            return Err(RelinkError::corrupt_index(
                &path,
                format!("unexpected header {:?}", headers),
            ));
        }

        for (i, row) in reader.deserialize::<IndexRow>().enumerate() {
            let line = i + 1;
            let row = row.map_err(|e| {
                RelinkError::corrupt_index(&path, format!("row {}: {}", line, e))
            })?;
            let record = parse_row(&path, line, row)?;
            if records.insert(record.path.clone(), record).is_some() {
                return Err(RelinkError::corrupt_index(
                    &path,
                    format!("row {}: duplicate path", line),
                ));
            }
        }

        debug!("loaded {} index records from {:?}", records.len(), path);
        Ok(Index {
            root,
            records,
            dirty: false,
        })
    }

    /// Path of the index file on disk
    pub fn path(&self) -> PathBuf {
        self.root.join(INDEX_FILE_NAME)
    }

    /// Look up the record for a root-relative path
    pub fn lookup(&self, path: &Path) -> Option<&FileRecord> {
        self.records.get(path)
    }

    /// Insert a record, replacing any existing record for the same path.
    ///
    /// The index only becomes dirty when the record actually differs, so a
    /// run that changes nothing leaves the file on disk untouched.
    pub fn upsert(&mut self, record: FileRecord) {
        match self.records.get(&record.path) {
            Some(existing) if *existing == record => {}
            _ => {
                trace!("index upsert: {:?}", record.path);
                self.records.insert(record.path.clone(), record);
                self.dirty = true;
            }
        }
    }

    /// Drop every record whose path is not in `keep`.
    ///
    /// Called at the end of a run with the set of paths the scanner
    /// enumerated, so rows for files deleted since the last run do not
    /// accumulate.
    pub fn retain_paths(&mut self, keep: &BTreeSet<PathBuf>) {
        let before = self.records.len();
        self.records.retain(|path, _| keep.contains(path));
        let pruned = before - self.records.len();
        if pruned > 0 {
            debug!("pruned {} stale index records", pruned);
            self.dirty = true;
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the index holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the in-memory table differs from the file on disk
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the full table back to disk, atomically.
    ///
    /// The table is serialized to `.relink-index.tmp` in the same directory
    /// and renamed over the old index, so a crash mid-write never leaves a
    /// truncated or half-written index visible. A clean index is not
    /// rewritten at all.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            debug!("index unchanged, skipping save");
            return Ok(());
        }

        let tmp = self.root.join(INDEX_TMP_NAME);
        {
            let mut writer = csv::Writer::from_writer(File::create(&tmp)?);
            for record in self.records.values() {
                let path = record.path.to_str().ok_or_else(|| RelinkError::NonUtf8Path {
                    path: record.path.clone(),
                })?;
                writer
                    .serialize(IndexRow {
                        path: path.to_string(),
                        size: record.size,
                        mtime_ns: record.mtime_ns,
                        inode: record.inode,
                        fingerprint: record.fingerprint.as_str().to_string(),
                    })
                    .map_err(|e| RelinkError::Io(std::io::Error::other(e)))?;
            }
            writer.flush()?;
        }

        // Atomic rename
        fs::rename(&tmp, self.path())?;
        self.dirty = false;
        debug!("saved {} index records to {:?}", self.records.len(), self.path());
        Ok(())
    }
}

/// Validate one parsed row into a [`FileRecord`]
fn parse_row(index_path: &Path, line: usize, row: IndexRow) -> Result<FileRecord> {
    if row.path.is_empty() {
        return Err(RelinkError::corrupt_index(
            index_path,
            format!("row {}: empty path", line),
        ));
    }
    let path = PathBuf::from(&row.path);
    if path.is_absolute() {
        return Err(RelinkError::corrupt_index(
            index_path,
            format!("row {}: absolute path {:?}", line, row.path),
        ));
    }
    let fingerprint = Fingerprint::parse(&row.fingerprint).ok_or_else(|| {
        RelinkError::corrupt_index(
            index_path,
            format!("row {}: malformed fingerprint {:?}", line, row.fingerprint),
        )
    })?;

    Ok(FileRecord {
        path,
        size: row.size,
        mtime_ns: row.mtime_ns,
        inode: row.inode,
        fingerprint,
    })
}
