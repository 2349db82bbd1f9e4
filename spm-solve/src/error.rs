//! Error handling.

use spm_types::{PackageConstraint, Version};

/// The error that can occur when validating the installed package set.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A required package is not installed at all.
    #[error("Package '{package}' depends on '{dependency}' which is not installed")]
    DependencyMissing {
        /// The package whose dependency is violated.
        package: String,
        /// The violated dependency constraint.
        dependency: PackageConstraint,
    },

    /// A required package is installed at an unsatisfying version.
    #[error(
        "Package '{package}' requires '{dependency}' but version {installed} is installed"
    )]
    Dependency {
        /// The package whose dependency is violated.
        package: String,
        /// The violated dependency constraint.
        dependency: PackageConstraint,
        /// The version that is actually installed.
        installed: Version,
    },

    /// An installed package matches a conflict constraint.
    #[error(
        "Package '{package}' conflicts with '{conflict}', version {installed} is installed"
    )]
    Conflict {
        /// The package declaring the conflict.
        package: String,
        /// The matched conflict constraint.
        conflict: PackageConstraint,
        /// The conflicting installed version.
        installed: Version,
    },

    /// A repository index error while collecting the installed set.
    #[error(transparent)]
    Db(#[from] spm_db::Error),
}
