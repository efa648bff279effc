//! Per-cache-entry locking.
//!
//! A fetch holds two locks for its `(name, version)` entry: an in-process
//! mutex, so worker threads never clone into the same path, and an advisory
//! file lock under `<cache root>/.locks/`, so two `jt` processes don't either.

use crate::error::{DepError, DepResult};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};

const LOCK_DIR: &str = ".locks";

#[derive(Default)]
pub struct EntryLocks {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

/// Held for the duration of a fetch. Dropping it releases both locks.
pub struct EntryGuard<'a> {
    locks: &'a EntryLocks,
    entry: PathBuf,
    file: Option<File>,
}

impl EntryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, cache_root: &Path, entry: &Path) -> DepResult<EntryGuard<'_>> {
        {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            while held.contains(entry) {
                held = self
                    .released
                    .wait(held)
                    .unwrap_or_else(|e| e.into_inner());
            }
            held.insert(entry.to_path_buf());
        }
        // From here on the guard owns the in-process slot, so early returns
        // release it too.
        let mut guard = EntryGuard {
            locks: self,
            entry: entry.to_path_buf(),
            file: None,
        };

        let lock_dir = cache_root.join(LOCK_DIR);
        fs::create_dir_all(&lock_dir)
            .map_err(|e| DepError::io("creating lock directory", &lock_dir, e))?;
        let lock_path = lock_dir.join(lock_file_name(entry));
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| DepError::io("opening lock file", &lock_path, e))?;

        tracing::debug!("waiting for lock {}", lock_path.display());
        file.lock_exclusive()
            .map_err(|e| DepError::io("locking cache entry", &lock_path, e))?;
        guard.file = Some(file);
        Ok(guard)
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
        }
        let mut held = self.locks.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.entry);
        self.locks.released.notify_all();
    }
}

fn lock_file_name(entry: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entry.as_os_str().as_encoded_bytes());
    format!("{:x}.lock", hasher.finalize())
}
