//! Error handling.

use std::path::PathBuf;

/// The error that can occur when driving the container runtime.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The container runtime binary cannot be located.
    #[error("Failed to locate the container runtime binary '{binary}':\n{source}")]
    RuntimeNotFound {
        /// The binary name that was looked up.
        binary: String,
        /// The source error.
        source: which::Error,
    },

    /// A container runtime command cannot be spawned.
    #[error("Failed to run '{command}':\n{source}")]
    Spawn {
        /// The command line that failed to spawn.
        command: String,
        /// The source error.
        source: std::io::Error,
    },

    /// A container runtime operation failed.
    #[error("Container runtime error while {context}:\n{details}")]
    Runtime {
        /// The context in which the error occurred.
        ///
        /// This is meant to complete the sentence "error while ".
        context: String,
        /// Details reported by the runtime (typically its stderr).
        details: String,
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

    /// The metadata tar stream cannot be unpacked.
    #[error("Failed to unpack package metadata while {context}:\n{source}")]
    Archive {
        /// The context in which the error occurred.
        context: &'static str,
        /// The source error.
        source: std::io::Error,
    },

    /// The metadata tar stream contains an entry escaping the target folder.
    #[error("Package metadata archive contains an unsafe path: {path}")]
    UnsafeArchivePath {
        /// The offending archive member path.
        path: PathBuf,
    },
}
