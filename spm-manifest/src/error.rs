//! Error handling.

use std::path::PathBuf;

/// The error that can occur when loading a package manifest.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
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

    /// An existing JSON manifest cannot be parsed.
    #[error("Failed to parse manifest {path}:\n{source}")]
    ParseJson {
        /// The path of the manifest file.
        path: PathBuf,
        /// The source error.
        source: serde_json::Error,
    },

    /// An existing YAML manifest cannot be parsed.
    #[error("Failed to parse manifest {path}:\n{source}")]
    ParseYaml {
        /// The path of the manifest file.
        path: PathBuf,
        /// The source error.
        source: serde_yaml::Error,
    },
}
