//! Exclusive per-root run lock
//!
//! Two runs over the same root would race on the index file and on
//! concurrent hardlink replacement of the same files, so a run holds a
//! lock file at the tree root for its whole duration. Creation uses
//! create-new semantics, which is atomic on every filesystem relink
//! supports.

use crate::error::{RelinkError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the run lock, relative to the scanned root
pub const LOCK_FILE_NAME: &str = ".relink-lock";

/// Guard owning the lock file; released (removed) on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Acquire the lock for `root`, failing with
    /// [`RelinkError::AlreadyRunning`] if another run holds it.
    ///
    /// The holder's pid is written into the file to help an operator
    /// identify a stale lock left behind by a killed process.
    pub fn acquire(root: &Path) -> Result<Self> {
        let path = root.join(LOCK_FILE_NAME);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = write!(file, "{}", std::process::id());
                debug!("acquired run lock {:?}", path);
                Ok(RunLock { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(RelinkError::AlreadyRunning { path })
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("failed to remove run lock {:?}: {}", self.path, e);
        }
    }
}
