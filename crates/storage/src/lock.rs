// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace writer lock.
//!
//! An advisory file lock held for the daemon's lifetime. A second daemon
//! starting in the same workspace fails with `store.lock_held` (exit 69).
//! Locks abandoned by a crashed daemon release automatically at the OS
//! level; the stale-TTL path covers filesystems where flock state survives
//! (or lock files left by a different host).

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::StoreError;

/// Default age after which an unheld lock file is considered abandoned.
pub const DEFAULT_STALE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Held workspace lock. Released on drop.
pub struct WorkspaceLock {
    path: PathBuf,
    // Held for the lifetime of the lock; the OS releases on drop/exit.
    _file: File,
}

impl WorkspaceLock {
    /// Acquire the workspace lock, breaking a stale one older than `ttl`.
    pub fn acquire(path: &Path, ttl: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        match Self::try_acquire(path) {
            Ok(lock) => Ok(lock),
            Err(StoreError::LockHeld { .. }) => {
                // Break the lock only when its file has not been touched
                // within the TTL; otherwise another daemon owns it.
                if lock_age(path).map(|age| age > ttl).unwrap_or(false) {
                    tracing::warn!(path = %path.display(), "breaking stale workspace lock");
                    let _ = std::fs::remove_file(path);
                    Self::try_acquire(path)
                } else {
                    Err(StoreError::LockHeld { path: path.to_path_buf() })
                }
            }
            Err(other) => Err(other),
        }
    }

    fn try_acquire(path: &Path) -> Result<Self, StoreError> {
        // Avoid truncating before we hold the lock, which would wipe the
        // running daemon's PID.
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::LockHeld { path: path.to_path_buf() });
        }

        let mut file = file;
        file.set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|source| StoreError::Io { path: path.to_path_buf(), source })?;

        Ok(Self { path: path.to_path_buf(), _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkspaceLock {
    fn drop(&mut self) {
        // The flock releases with the file handle; removing the file keeps
        // the cache directory tidy for the next daemon.
        let _ = std::fs::remove_file(&self.path);
    }
}

fn lock_age(path: &Path) -> Option<Duration> {
    path.metadata().ok()?.modified().ok()?.elapsed().ok()
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
