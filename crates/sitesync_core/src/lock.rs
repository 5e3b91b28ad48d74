//! Single-writer lock for file-backed stores.
//!
//! A store file `queue.log` is guarded by a sibling `queue.log.lock`. The
//! lock is advisory (`fs2`) and released when the process exits, so a crash
//! never leaves the store permanently locked.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Held exclusive lock on a store file.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    _file: File,
}

impl StoreLock {
    /// Takes the lock guarding `store_path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another handle holds it.
    pub fn acquire(store_path: &Path) -> CoreResult<Self> {
        let path = lock_path(store_path);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(CoreError::StoreLocked);
        }

        Ok(Self { path, _file: file })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Path of the lock file guarding `store_path`.
#[must_use]
pub fn lock_path(store_path: &Path) -> PathBuf {
    let mut name = store_path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}
