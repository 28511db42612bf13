// src/core/lock.rs

use crate::core::error::{StoreError, StoreResult};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Advisory lock held by a mutating operation for its whole duration.
///
/// The lock file is created with `create_new`, so a second holder fails
/// immediately instead of waiting. The file records the holder's pid and a
/// token; it is removed on drop only if the token is still ours.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
    token: String,
}

impl StoreLock {
    /// Acquires the lock at `path`.
    ///
    /// # Errors
    /// [`StoreError::Busy`] if the lock is already held, [`StoreError::Io`]
    /// for any other failure.
    pub fn acquire(path: &Path) -> StoreResult<Self> {
        let token = Uuid::new_v4().to_string();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(path)
                    .ok()
                    .and_then(|content| content.lines().next().map(str::to_string))
                    .filter(|pid| !pid.is_empty())
                    .map(|pid| format!(", pid {}", pid))
                    .unwrap_or_default();
                return Err(StoreError::Busy {
                    path: path.to_path_buf(),
                    holder,
                });
            }
            Err(e) => return Err(StoreError::io(path, e)),
        };
        writeln!(file, "{}\n{}", std::process::id(), token)
            .map_err(|e| StoreError::io(path, e))?;
        log::debug!("Acquired store lock at '{}'.", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            token,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let ours = fs::read_to_string(&self.path)
            .map(|content| content.lines().nth(1) == Some(self.token.as_str()))
            .unwrap_or(false);
        if ours {
            if let Err(e) = fs::remove_file(&self.path) {
                log::warn!(
                    "Failed to release store lock '{}': {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind as StoreErrorKind;
    use tempfile::tempdir;

    #[test]
    fn test_second_acquire_fails_busy() {
        // --- Setup ---
        let dir = tempdir().unwrap();
        let path = dir.path().join(".envkeep.lock");
        let _held = StoreLock::acquire(&path).unwrap();

        // --- Execute ---
        let second = StoreLock::acquire(&path);

        // --- Assert ---
        let err = second.unwrap_err();
        assert_eq!(err.kind(), StoreErrorKind::Busy);
        assert!(err.to_string().contains(&std::process::id().to_string()));
        assert!(err.to_string().contains("if no envkeep process is running"));
    }

    #[test]
    fn test_drop_releases_lock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".envkeep.lock");
        {
            let lock = StoreLock::acquire(&path).unwrap();
            assert!(lock.path().exists());
        }
        assert!(!path.exists());
        assert!(StoreLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_drop_leaves_foreign_lock_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(".envkeep.lock");
        let lock = StoreLock::acquire(&path).unwrap();
        fs::write(&path, "999\nsomeone-else\n").unwrap();
        drop(lock);
        assert!(path.exists());
    }
}
