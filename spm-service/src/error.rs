//! Error handling.

use std::path::PathBuf;

/// The error that can occur during host service integration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A manifest names an unsupported base service in `dependent-of`.
    #[error("Unsupported base service '{service}' in dependent-of, only 'swss' is accepted")]
    UnsupportedBaseService {
        /// The rejected base service name.
        service: String,
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

    /// A shared infrastructure error (template rendering, host commands).
    #[error(transparent)]
    Common(#[from] spm_common::Error),

    /// A repository index error while collecting dependent services.
    #[error(transparent)]
    Db(#[from] spm_db::Error),
}
