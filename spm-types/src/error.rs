//! Error handling.

/// The error that can occur when working with package manager types.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A version string does not follow semver 2.0.
    #[error("Invalid version '{version}': {source}")]
    InvalidVersion {
        /// The offending version string.
        version: String,
        /// The underlying semver parse error.
        source: semver::Error,
    },

    /// A version constraint expression cannot be parsed.
    #[error("Invalid version constraint expression '{0}'")]
    InvalidConstraint(String),

    /// A package constraint expression cannot be parsed.
    #[error("Invalid package constraint expression '{expression}': {reason}")]
    InvalidPackageConstraint {
        /// The offending package constraint expression.
        expression: String,
        /// What is wrong with the expression.
        reason: String,
    },
}
