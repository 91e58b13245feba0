// src/lock.rs

//! Locks around the package database
//!
//! # Lock Strategy
//!
//! - **Run lock**: an `flock(LOCK_EX)` on our own lock file, held for the
//!   whole orchestration run so two runs never overlap or share an ignore set
//! - **Database lock**: pacman's `db.lck`. This is not a cooperative lock.
//!   Before a privileged phase, competing package managers are killed and a
//!   leftover lock file is deleted. Destructive and best-effort.

use crate::error::{Error, Result};
use crate::exec::{CommandExecutor, CommandSpec};
use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Exclusive lock held for the lifetime of one orchestration run
///
/// Released automatically on drop.
pub struct RunLock {
    /// Kept open to hold the lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Try to take the lock without blocking
    ///
    /// Returns `Error::RunLocked` if another run holds it.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!("Acquired run lock at {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::RunLocked(path)),
            Err(e) => Err(Error::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release run lock {}: {}", self.path.display(), e);
        }
    }
}

/// Forcible release of the package database lock
#[derive(Debug, Clone)]
pub struct DatabaseLock {
    path: PathBuf,
    competitors: Vec<String>,
}

impl DatabaseLock {
    pub fn new(path: impl Into<PathBuf>, competitors: Vec<String>) -> Self {
        Self {
            path: path.into(),
            competitors,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kill competing package managers, then delete the lock if it remains
    ///
    /// Every step is best-effort; failures are logged and ignored.
    pub async fn force_release(&self, executor: &dyn CommandExecutor) {
        info!("Ensuring database lock is released...");

        for process in &self.competitors {
            let spec = CommandSpec::new(["pkill", "-9", "-x", process.as_str()])
                .privileged()
                .describe(format!("Stopping {}", process));
            // pkill exits 1 when nothing matched; that is the common case
            let _ = executor.outcome(&spec).await;
        }

        // With every holder gone, a remaining lock file is stale
        if self.path.exists() {
            let path = self.path.to_string_lossy().into_owned();
            let spec = CommandSpec::new(["rm", "-f", path.as_str()])
                .privileged()
                .describe("Removing stale database lock");
            let removed = executor.outcome(&spec).await;
            if removed.success {
                info!("Removed stale lock {}", path);
            } else {
                warn!("Could not remove {}: {}", path, removed.error_text());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lock_is_exclusive() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("locks/aio.lock");

        let lock = RunLock::try_acquire(&path).unwrap();
        assert_eq!(lock.path(), path.as_path());

        match RunLock::try_acquire(&path) {
            Err(Error::RunLocked(p)) => assert_eq!(p, path),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("second run lock should not be granted"),
        }

        drop(lock);
        assert!(RunLock::try_acquire(&path).is_ok());
    }
}
