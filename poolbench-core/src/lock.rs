// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Host-wide exclusive lock serializing latency scopes.
//!
//! Traffic-shaping state on an interface is shared by every process on the
//! host, so two scopes must never overlap. The lock is an advisory `flock`
//! on a well-known file; it is released when the handle is dropped, which
//! also happens when the process dies.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::LatencyScopeError;

/// Exclusive hold on the latency lock file.
#[derive(Debug)]
pub struct HostLock {
    path: PathBuf,
    _file: Flock<File>,
}

impl HostLock {
    /// Take the lock without blocking.
    ///
    /// Returns `LatencyScopeError::Busy` if another scope holds it.
    pub fn try_acquire(path: &Path) -> Result<Self, LatencyScopeError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| LatencyScopeError::Lock {
                lock_path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let file = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(
            |(_, errno)| match errno {
                Errno::EWOULDBLOCK => LatencyScopeError::Busy {
                    lock_path: path.to_path_buf(),
                },
                other => LatencyScopeError::Lock {
                    lock_path: path.to_path_buf(),
                    reason: other.desc().to_string(),
                },
            },
        )?;

        tracing::debug!(lock = %path.display(), "Acquired latency lock");

        Ok(Self {
            path: path.to_path_buf(),
            _file: file,
        })
    }
}

impl Drop for HostLock {
    fn drop(&mut self) {
        tracing::debug!(lock = %self.path.display(), "Released latency lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latency.lock");

        let first = HostLock::try_acquire(&path).unwrap();
        let second = HostLock::try_acquire(&path);
        assert!(matches!(second, Err(LatencyScopeError::Busy { .. })));

        drop(first);
        assert!(HostLock::try_acquire(&path).is_ok());
    }

    #[test]
    fn test_unwritable_location() {
        let result = HostLock::try_acquire(Path::new("/nonexistent/dir/latency.lock"));
        assert!(matches!(result, Err(LatencyScopeError::Lock { .. })));
    }
}
