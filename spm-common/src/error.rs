//! Error handling.

use std::path::PathBuf;

/// The error that can occur in the shared package manager infrastructure.
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

    /// A command could not be spawned.
    #[error("Failed to run '{command}':\n{source}")]
    CommandSpawn {
        /// The command line that failed to spawn.
        command: String,
        /// The source error.
        source: std::io::Error,
    },

    /// A command ran but exited unsuccessfully.
    #[error("Command '{command}' failed:\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    CommandFailed {
        /// The command line that failed.
        command: String,
        /// The stdout of the failed command.
        stdout: String,
        /// The stderr of the failed command.
        stderr: String,
    },

    /// A template could not be rendered.
    #[error("Failed to render template {path}:\n{source}")]
    Template {
        /// The path of the template file.
        path: PathBuf,
        /// The source error.
        source: Box<handlebars::RenderError>,
    },

    /// The host version file cannot be parsed.
    #[error("Failed to parse host version file {path}:\n{reason}")]
    HostInfo {
        /// The path of the host version file.
        path: PathBuf,
        /// What is wrong with the file.
        reason: String,
    },
}
