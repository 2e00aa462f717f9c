//! Exclusive advisory lock over a store root (spec §5, component C9).
//!
//! Acquired once at process start and released on `Drop` — the idiomatic
//! Rust expression of "held for the duration of any mutating operation,
//! released at exit."

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::{Error, Result};

/// RAII guard around an exclusive, non-blocking lock on `<store>/.lock`.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock, failing fast with `LockHeld` if another process
    /// already holds it.
    pub fn acquire<P: AsRef<Path>>(store_root: P) -> Result<Self> {
        let path = store_root.as_ref().join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive().map_err(|_| Error::LockHeld {
            path: path.display().to_string(),
        })?;
        Ok(Self { file, path })
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
