//! The deduplication engine
//!
//! This module orchestrates a full run over one directory tree:
//!
//! 1. **Lock**: an exclusive lock file excludes concurrent runs over the
//!    same root.
//! 2. **Scan**: the tree is enumerated in deterministic lexical order;
//!    stale temporary links left behind by a crashed run are swept.
//! 3. **Fingerprint**: each file's fingerprint is taken from the index
//!    when its `(size, mtime)` is unchanged, and computed in parallel
//!    otherwise. A failure to read one file is recorded and the run
//!    continues.
//! 4. **Group**: files are grouped by `(device, fingerprint)`. Hardlinks
//!    never span devices, so members on different devices form independent
//!    groups by construction.
//! 5. **Link**: within each group the lexically smallest path is the
//!    canonical file; every member on a different inode is atomically
//!    replaced by a hardlink to it (temporary link in the same directory,
//!    then rename over the original). Members already sharing the
//!    canonical inode need no action, which is what makes a second run a
//!    no-op.
//! 6. **Save**: records are refreshed, stale rows pruned, and the index
//!    written back atomically.
//!
//! Grouping before linking (rather than linking greedily during the scan)
//! keeps the canonical choice independent of traversal interleaving; the
//! lexical tie-break is the single source of nondeterminism and it is
//! fixed, so re-running on unchanged input is a no-op.
//!
//! The filesystem is the durable, authoritative side effect; the index is
//! only a cache. A failure to persist the index is reported but never
//! undoes completed link operations.

use crate::error::{RelinkError, Result};
use crate::fingerprint::{fingerprint_file, Fingerprint};
use crate::index::Index;
use crate::lock::RunLock;
use crate::probe::probe;
use crate::scanner::Scanner;
use crate::types::{DedupReport, FileMeta, FileRecord, ProgressInfo, SkippedFile};
use chrono::Utc;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// Name prefix of the temporary links created during atomic replacement
pub const LINK_TMP_PREFIX: &str = ".relink-tmp-";

/// Progress callback type
pub type ProgressFn = Arc<dyn Fn(ProgressInfo) + Send + Sync>;

/// One enumerated file with its probed metadata
#[derive(Debug, Clone)]
struct ScanItem {
    /// Path relative to the root (index key)
    rel: PathBuf,
    /// Absolute path on disk
    abs: PathBuf,
    meta: FileMeta,
}

/// One member of a fingerprint group
#[derive(Debug, Clone)]
struct Member {
    rel: PathBuf,
    abs: PathBuf,
    device: u64,
    inode: u64,
    nlink: u64,
    size: u64,
    mtime_ns: i64,
}

/// Builder for [`Deduper`]
///
/// ```rust,no_run
/// use relink::DeduperBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut deduper = DeduperBuilder::new()
///     .workers(4)
///     .exclude_patterns(vec!["*.part".to_string()])
///     .build("./downloads")?;
/// let report = deduper.run()?;
/// # Ok(())
/// # }
/// ```
pub struct DeduperBuilder {
    workers: usize,
    dry_run: bool,
    excludes: Vec<String>,
    progress: Option<ProgressFn>,
}

impl DeduperBuilder {
    /// Create a builder with defaults: one worker per CPU, no excludes,
    /// real run
    pub fn new() -> Self {
        DeduperBuilder {
            workers: num_cpus::get(),
            dry_run: false,
            excludes: Vec::new(),
            progress: None,
        }
    }

    /// Set the number of fingerprinting workers (minimum 1)
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Report what would be linked without modifying the filesystem or the
    /// index
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set glob patterns for paths to exclude from the scan
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.excludes = patterns;
        self
    }

    /// Install a progress callback, invoked from the fingerprinting and
    /// linking phases
    pub fn progress(mut self, callback: ProgressFn) -> Self {
        self.progress = Some(callback);
        self
    }

    /// Validate the target and build the engine.
    ///
    /// Fails with [`RelinkError::NotFound`] or
    /// [`RelinkError::RootNotDirectory`] when the target is unusable; this
    /// is the unrecoverable setup error the CLI turns into a non-zero
    /// exit.
    pub fn build(self, root: impl Into<PathBuf>) -> Result<Deduper> {
        let root = root.into();
        let metadata = fs::metadata(&root).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => RelinkError::NotFound { path: root.clone() },
            _ => RelinkError::Io(e),
        })?;
        if !metadata.is_dir() {
            return Err(RelinkError::RootNotDirectory { path: root });
        }
        let root = fs::canonicalize(root)?;

        Ok(Deduper {
            root,
            workers: self.workers,
            dry_run: self.dry_run,
            excludes: self.excludes,
            progress: self.progress,
        })
    }
}

impl Default for DeduperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The deduplication engine for one directory tree.
///
/// Owns the persistent index exclusively for the duration of each
/// [`run`](Deduper::run); concurrent runs over the same root are rejected
/// via the run lock.
pub struct Deduper {
    root: PathBuf,
    workers: usize,
    dry_run: bool,
    excludes: Vec<String>,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for Deduper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deduper")
            .field("root", &self.root)
            .field("workers", &self.workers)
            .field("dry_run", &self.dry_run)
            .field("excludes", &self.excludes)
            .field("progress", &self.progress.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

impl Deduper {
    /// Root directory this engine operates on (canonicalized)
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Execute one full deduplication run.
    ///
    /// Per-file failures (unreadable entries, vanished files, failed link
    /// replacements) are recorded in the report and never abort the run.
    /// Run-level failures are: the lock being held, an I/O failure on the
    /// root itself, an internal invariant violation, and a failure to
    /// persist the index at the end (by then all completed link operations
    /// are durable).
    pub fn run(&mut self) -> Result<DedupReport> {
        let start = Instant::now();
        let _lock = RunLock::acquire(&self.root)?;
        info!("deduplicating {:?}", self.root);

        let mut index_rebuilt = false;
        let mut index = match Index::load(&self.root) {
            Ok(index) => index,
            Err(e @ RelinkError::CorruptIndex { .. }) => {
                // Rebuild policy: the run proceeds with an empty index and
                // the resulting full re-hash is visible in the report
                warn!("{}; rebuilding index from scratch", e);
                index_rebuilt = true;
                Index::empty(&self.root)
            }
            Err(e) => return Err(e),
        };

        let mut skipped: Vec<SkippedFile> = Vec::new();

        // Enumerate the tree
        let scanner = Scanner::new(&self.root).with_excludes(self.excludes.clone());
        let mut scanned: Vec<PathBuf> = Vec::new();
        for entry in scanner.scan()? {
            match entry {
                Ok(rel) => scanned.push(rel),
                Err(e) => {
                    let path = match &e {
                        RelinkError::WalkDir(we) => {
                            we.path().map(Path::to_path_buf).unwrap_or_default()
                        }
                        _ => PathBuf::new(),
                    };
                    // Failing to read the root itself is run-level; any
                    // deeper entry is skipped like any other bad file
                    if path == self.root {
                        return Err(e);
                    }
                    warn!("skipping unreadable entry {:?}: {}", path, e);
                    skipped.push(SkippedFile {
                        path,
                        reason: e.to_string(),
                    });
                }
            }
        }
        let files_scanned = scanned.len();
        debug!("scanned {} regular files", files_scanned);

        if !self.dry_run {
            self.sweep_stale_temps(&scanned);
        }

        // Probe metadata; the scanned set doubles as the set of live index
        // keys for pruning later
        let mut seen: BTreeSet<PathBuf> = BTreeSet::new();
        let mut items: Vec<ScanItem> = Vec::with_capacity(scanned.len());
        for rel in scanned {
            seen.insert(rel.clone());
            let abs = self.root.join(&rel);
            if rel.to_str().is_none() {
                let e = RelinkError::NonUtf8Path { path: rel.clone() };
                warn!("skipping {:?}: {}", rel, e);
                skipped.push(SkippedFile {
                    path: rel,
                    reason: e.to_string(),
                });
                continue;
            }
            match probe(&abs) {
                Ok(meta) => items.push(ScanItem { rel, abs, meta }),
                // Vanished, unreadable, or replaced by a non-regular
                // entry since enumeration: record and move on
                Err(e) => {
                    warn!("skipping {:?}: {}", rel, e);
                    skipped.push(SkippedFile {
                        path: rel,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Split into cache hits and files that need hashing
        let mut resolved: Vec<(ScanItem, Fingerprint)> = Vec::with_capacity(items.len());
        let mut to_hash: Vec<ScanItem> = Vec::new();
        for item in items {
            match index.lookup(&item.rel) {
                Some(record)
                    if record.size == item.meta.size && record.mtime_ns == item.meta.mtime_ns =>
                {
                    trace!("cache hit: {:?}", item.rel);
                    let fingerprint = record.fingerprint.clone();
                    resolved.push((item, fingerprint));
                }
                _ => {
                    trace!("cache miss: {:?}", item.rel);
                    to_hash.push(item);
                }
            }
        }
        let cache_hits = resolved.len();

        // Fingerprint cache misses in parallel; hashing is the dominant
        // cost and every file is independent
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| RelinkError::ThreadPool(e.to_string()))?;
        let hash_total = to_hash.len();
        let hashed_count = AtomicUsize::new(0);
        let hash_skips: Mutex<Vec<SkippedFile>> = Mutex::new(Vec::new());
        let progress = self.progress.clone();

        let hashed: Vec<Option<(ScanItem, Fingerprint)>> = pool.install(|| {
            to_hash
                .into_par_iter()
                .map(|item| {
                    let n = hashed_count.fetch_add(1, Ordering::Relaxed) + 1;
                    report_progress(&progress, "fingerprinting", n, Some(hash_total), &item.rel);
                    match fingerprint_file(&item.abs) {
                        Ok(fingerprint) => Some((item, fingerprint)),
                        Err(e) => {
                            warn!("skipping {:?}: {}", item.rel, e);
                            hash_skips.lock().push(SkippedFile {
                                path: item.rel,
                                reason: e.to_string(),
                            });
                            None
                        }
                    }
                })
                .collect()
        });
        skipped.extend(hash_skips.into_inner());

        let mut fingerprints_computed = 0;
        for outcome in hashed {
            if let Some(entry) = outcome {
                fingerprints_computed += 1;
                resolved.push(entry);
            }
        }
        debug!(
            "{} fingerprints computed, {} reused from index",
            fingerprints_computed, cache_hits
        );

        // Refresh records and group by (device, fingerprint); the sorted
        // map gives the link phase a deterministic processing order
        let mut groups: BTreeMap<(u64, Fingerprint), Vec<Member>> = BTreeMap::new();
        for (item, fingerprint) in resolved {
            index.upsert(FileRecord {
                path: item.rel.clone(),
                size: item.meta.size,
                mtime_ns: item.meta.mtime_ns,
                inode: item.meta.inode,
                fingerprint: fingerprint.clone(),
            });
            groups
                .entry((item.meta.device, fingerprint))
                .or_default()
                .push(Member {
                    rel: item.rel,
                    abs: item.abs,
                    device: item.meta.device,
                    inode: item.meta.inode,
                    nlink: item.meta.nlink,
                    size: item.meta.size,
                    mtime_ns: item.meta.mtime_ns,
                });
        }
        let duplicate_groups = groups.values().filter(|members| members.len() > 1).count();

        // Link phase. Sequential on purpose: all mutations against a given
        // canonical file must be serialized
        let mut files_linked = 0usize;
        let mut bytes_reclaimed = 0u64;
        let mut temp_seq = 0u64;
        for ((device, fingerprint), members) in groups {
            if members.len() < 2 {
                continue;
            }
            let distinct_inodes: BTreeSet<u64> = members.iter().map(|m| m.inode).collect();
            if distinct_inodes.len() < 2 {
                trace!("group {} already deduplicated", fingerprint);
                continue;
            }

            // Canonical file: lexically smallest path. Fixed tie-break,
            // stable across runs on unchanged input
            let Some(canonical) = members.iter().min_by(|a, b| a.rel.cmp(&b.rel)).cloned()
            else {
                continue;
            };
            debug!(
                "group {} ({} members, {} inodes), canonical {:?}",
                fingerprint,
                members.len(),
                distinct_inodes.len(),
                canonical.rel
            );

            for member in &members {
                if member.inode == canonical.inode {
                    continue;
                }
                if member.device != device {
                    // Unreachable: device is part of the group key
                    return Err(RelinkError::CrossDeviceLink {
                        path: member.rel.clone(),
                        expected: device,
                        found: member.device,
                    });
                }

                report_progress(&self.progress, "linking", files_linked + 1, None, &member.rel);

                if self.dry_run {
                    info!("would link {:?} -> {:?}", member.rel, canonical.rel);
                    files_linked += 1;
                    if member.nlink == 1 {
                        bytes_reclaimed += member.size;
                    }
                    continue;
                }

                match replace_with_link(&canonical.abs, &member.abs, &mut temp_seq) {
                    Ok(()) => {
                        trace!("linked {:?} -> {:?}", member.rel, canonical.rel);
                        files_linked += 1;
                        if member.nlink == 1 {
                            bytes_reclaimed += member.size;
                        }
                        // The path now denotes the canonical inode; record
                        // its identity so the next run cache-hits without
                        // re-hashing
                        index.upsert(FileRecord {
                            path: member.rel.clone(),
                            size: canonical.size,
                            mtime_ns: canonical.mtime_ns,
                            inode: canonical.inode,
                            fingerprint: fingerprint.clone(),
                        });
                    }
                    Err(e) if e.is_recoverable() => {
                        warn!("could not link {:?}: {}", member.rel, e);
                        skipped.push(SkippedFile {
                            path: member.rel.clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        // Persist the index. Link operations above are already durable;
        // a save failure is reported but cannot undo them
        index.retain_paths(&seen);
        if !self.dry_run {
            index.save()?;
        }

        let report = DedupReport {
            files_scanned,
            fingerprints_computed,
            cache_hits,
            duplicate_groups,
            files_linked,
            bytes_reclaimed,
            skipped,
            index_rebuilt,
            dry_run: self.dry_run,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at: Utc::now(),
        };
        info!(
            "run complete: {} scanned, {} hashed, {} cache hits, {} linked, {} bytes reclaimed",
            report.files_scanned,
            report.fingerprints_computed,
            report.cache_hits,
            report.files_linked,
            report.bytes_reclaimed
        );
        Ok(report)
    }

    /// Remove temporary links left behind by a crashed run.
    ///
    /// A stale temp is always a second name for an inode whose canonical
    /// path still exists (the crash happened between link and rename), so
    /// removing it never loses data. Only directories that contain scanned
    /// files are checked, plus the root itself.
    fn sweep_stale_temps(&self, scanned: &[PathBuf]) {
        let mut dirs: BTreeSet<PathBuf> = BTreeSet::new();
        dirs.insert(self.root.clone());
        for rel in scanned {
            if let Some(parent) = rel.parent() {
                if !parent.as_os_str().is_empty() {
                    dirs.insert(self.root.join(parent));
                }
            }
        }

        for dir in dirs {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(LINK_TMP_PREFIX)
                {
                    let path = entry.path();
                    match fs::remove_file(&path) {
                        Ok(()) => info!("removed stale temp link {:?}", path),
                        Err(e) => warn!("could not remove stale temp link {:?}: {}", path, e),
                    }
                }
            }
        }
    }
}

/// Atomically replace `member` with a hardlink to `canonical`.
///
/// The link is created under a temporary name in the member's own
/// directory, then renamed over the member. A crash between the two steps
/// leaves either the original file or the finished link, never a missing
/// path; the stale temp is swept by the next run.
fn replace_with_link(canonical: &Path, member: &Path, temp_seq: &mut u64) -> Result<()> {
    let parent = member.parent().ok_or_else(|| RelinkError::LinkFailed {
        path: member.to_path_buf(),
        canonical: canonical.to_path_buf(),
        source: std::io::Error::other("member path has no parent directory"),
    })?;
    let temp = parent.join(format!(
        "{}{}-{}",
        LINK_TMP_PREFIX,
        std::process::id(),
        temp_seq
    ));
    *temp_seq += 1;

    fs::hard_link(canonical, &temp).map_err(|e| RelinkError::LinkFailed {
        path: member.to_path_buf(),
        canonical: canonical.to_path_buf(),
        source: e,
    })?;

    if let Err(e) = fs::rename(&temp, member) {
        // The original member is untouched; drop the temp so it does not
        // linger as a stray extra link
        let _ = fs::remove_file(&temp);
        return Err(RelinkError::RenameFailed {
            from: temp,
            to: member.to_path_buf(),
            source: e,
        });
    }
    Ok(())
}

fn report_progress(
    progress: &Option<ProgressFn>,
    operation: &str,
    processed: usize,
    total: Option<usize>,
    current: &Path,
) {
    if let Some(callback) = progress {
        callback(ProgressInfo {
            operation: operation.to_string(),
            processed,
            total,
            current: Some(current.display().to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_rejects_missing_root() {
        let dir = TempDir::new().unwrap();
        let err = DeduperBuilder::new()
            .build(dir.path().join("nope"))
            .unwrap_err();
        assert!(matches!(err, RelinkError::NotFound { .. }));
    }

    #[test]
    fn test_build_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("f");
        fs::write(&file, "x").unwrap();
        let err = DeduperBuilder::new().build(&file).unwrap_err();
        assert!(matches!(err, RelinkError::RootNotDirectory { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn test_replace_with_link_links_atomically() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().join("canonical");
        let member = dir.path().join("member");
        fs::write(&canonical, "hello").unwrap();
        fs::write(&member, "hello").unwrap();

        let mut seq = 0;
        replace_with_link(&canonical, &member, &mut seq).unwrap();

        use std::os::unix::fs::MetadataExt;
        let m1 = fs::metadata(&canonical).unwrap();
        let m2 = fs::metadata(&member).unwrap();
        assert_eq!(m1.ino(), m2.ino());
        assert_eq!(m1.nlink(), 2);
        assert_eq!(fs::read(&member).unwrap(), b"hello");
    }

    #[test]
    fn test_replace_with_link_failure_leaves_member_intact() {
        let dir = TempDir::new().unwrap();
        let canonical = dir.path().join("missing-canonical");
        let member = dir.path().join("member");
        fs::write(&member, "original").unwrap();

        let mut seq = 0;
        let err = replace_with_link(&canonical, &member, &mut seq).unwrap_err();
        assert!(matches!(err, RelinkError::LinkFailed { .. }));
        assert!(err.is_recoverable());
        assert_eq!(fs::read(&member).unwrap(), b"original");

        // No temp file left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(LINK_TMP_PREFIX))
            .collect();
        assert!(leftovers.is_empty());
    }
}
