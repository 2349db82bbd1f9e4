//! Error handling.

use std::path::PathBuf;

/// The error that can occur when working with the configuration store.
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

    /// A persisted configuration file cannot be parsed or serialized.
    #[error("Invalid configuration file {path}:\n{source}")]
    Json {
        /// The path of the configuration file.
        path: PathBuf,
        /// The source error.
        source: serde_json::Error,
    },

    /// Deregistration was refused because the feature is still enabled.
    #[error("Feature '{feature}' is enabled, disable it before removal")]
    FeatureEnabled {
        /// The feature that is still enabled.
        feature: String,
    },

    /// A shared infrastructure error.
    #[error(transparent)]
    Common(#[from] spm_common::Error),
}
