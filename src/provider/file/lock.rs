//! # Store Lock
//!
//! Exclusive advisory lock shared by every process using one store file.
//!
//! The lock is taken on a sidecar `<path>.lock` file rather than the store
//! itself, since saving renames a new document over the old inode. It is
//! released when the guard is dropped.

use crate::error::{BackendError, Result};
use crate::provider::file::io_error;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

const LOCK_EXTENSION: &str = "lock";

#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Sidecar lock file guarding `target`
    pub(crate) fn lock_path(target: &Path) -> PathBuf {
        let mut name = target.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(format!(".{LOCK_EXTENSION}"));
        target.with_file_name(name)
    }

    /// Block until the lock guarding `target` is held
    ///
    /// Creates the parent directory and the sidecar file if needed.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the lock file cannot be opened or locked.
    pub(crate) async fn acquire(target: &Path) -> Result<Self> {
        let path = Self::lock_path(target);

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error("create store directory", parent, &e))?;
        }

        let lock_path = path.clone();
        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&lock_path)?;
            FileExt::lock_exclusive(&file)?;
            Ok(file)
        })
        .await
        .map_err(|e| BackendError::permanent("lock store", format!("{}: {e}", path.display())))?
        .map_err(|e| io_error("lock store", &path, &e))?;

        debug!("Acquired store lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to release store lock {}: {}", self.path.display(), e);
        }
    }
}
