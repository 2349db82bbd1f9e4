//! Error handling.

use std::path::PathBuf;

/// The error that can occur when working with the repository index.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No repository with the given name exists.
    #[error("Repository '{name}' does not exist in the index")]
    NotFound {
        /// The name of the missing repository.
        name: String,
    },

    /// A repository with the given name already exists.
    #[error("Repository '{name}' already exists in the index")]
    AlreadyExists {
        /// The name of the colliding repository.
        name: String,
    },

    /// The repository cannot be removed while its package is installed.
    #[error("Repository '{name}' is installed, uninstall the package first")]
    StillInstalled {
        /// The name of the installed repository.
        name: String,
    },

    /// The repository is essential and must not be removed or uninstalled.
    #[error("Repository '{name}' is essential and cannot be removed")]
    Essential {
        /// The name of the essential repository.
        name: String,
    },

    /// The index file or an installed entry is in an inconsistent state.
    #[error("Repository index at {path} is corrupt: {reason}")]
    Corrupt {
        /// The path of the corrupt index or entry.
        path: PathBuf,
        /// What is inconsistent.
        reason: String,
    },

    /// An I/O error occurred at a path.
    #[error("I/O error at path {path} while {context}:\n{source}")]
    IoPath {
        /// The path at which the error occurred.
        path: PathBuf,
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "I/O error at path while ".
        context: &'static str,
        /// The source error.
        source: std::io::Error,
    },

    /// The index cannot be serialized.
    #[error("Failed to serialize the repository index:\n{0}")]
    Serialize(#[from] serde_yaml::Error),

    /// The advisory index lock cannot be acquired.
    #[error("Failed to lock {path}: {errno}")]
    Lock {
        /// The path of the lock file.
        path: PathBuf,
        /// The underlying errno.
        errno: nix::errno::Errno,
    },

    /// A manifest of an installed package cannot be loaded.
    #[error(transparent)]
    Manifest(#[from] spm_manifest::Error),

    /// A shared infrastructure error.
    #[error(transparent)]
    Common(#[from] spm_common::Error),
}
