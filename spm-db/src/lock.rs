//! The process-wide advisory index lock.
//!
//! At most one package manager instance may mutate the index, the generated
//! service files and the feature rows at a time. Mutating operations take
//! the exclusive lock for the whole transaction; read-only operations take
//! the shared lock.

use std::{
    fmt,
    fs::{File, OpenOptions, create_dir_all},
    path::{Path, PathBuf},
};

use nix::fcntl::{Flock, FlockArg};

use crate::Error;

/// The name of the lock file inside the package manager directory.
const LOCK_FILE_NAME: &str = "lock";

/// An advisory `flock` on the package manager directory.
///
/// The lock is released when the guard is dropped.
pub struct IndexLock {
    path: PathBuf,
    _flock: Flock<File>,
}

impl IndexLock {
    /// Takes the exclusive lock, blocking until it is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn exclusive(base_dir: &Path) -> Result<Self, Error> {
        IndexLock::acquire(base_dir, FlockArg::LockExclusive)
    }

    /// Takes the shared lock, blocking until it is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn shared(base_dir: &Path) -> Result<Self, Error> {
        IndexLock::acquire(base_dir, FlockArg::LockShared)
    }

    fn acquire(base_dir: &Path, arg: FlockArg) -> Result<Self, Error> {
        create_dir_all(base_dir).map_err(|source| Error::IoPath {
            path: base_dir.to_path_buf(),
            context: "creating the package manager directory",
            source,
        })?;
        let path = base_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "creating the index lock file",
                source,
            })?;
        let flock = Flock::lock(file, arg).map_err(|(_, errno)| Error::Lock {
            path: path.clone(),
            errno,
        })?;
        Ok(IndexLock {
            path,
            _flock: flock,
        })
    }
}

impl fmt::Debug for IndexLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexLock")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn lock_file_is_created() -> TestResult {
        let tmp = tempfile::tempdir()?;
        let lock = IndexLock::exclusive(tmp.path())?;
        assert!(tmp.path().join(LOCK_FILE_NAME).exists());
        drop(lock);
        Ok(())
    }

    #[test]
    fn shared_locks_coexist() -> TestResult {
        let tmp = tempfile::tempdir()?;
        let first = IndexLock::shared(tmp.path())?;
        let second = IndexLock::shared(tmp.path())?;
        drop(first);
        drop(second);
        Ok(())
    }
}
