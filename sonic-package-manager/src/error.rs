//! Error handling.

use spm_types::{Version, VersionConstraint};

/// The error that can occur when installing or uninstalling packages.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Root privileges are required for mutating operations.
    #[error("Root privileges required for this operation")]
    RootRequired,

    /// The package is already installed.
    #[error("Package '{name}' is already installed, uninstall first if you try to upgrade")]
    AlreadyInstalled {
        /// The name of the installed package.
        name: String,
    },

    /// The package is not installed.
    #[error("Package '{name}' is not installed")]
    NotInstalled {
        /// The name of the package.
        name: String,
    },

    /// The package is essential and must stay installed.
    #[error("Package '{name}' is essential and cannot be uninstalled")]
    Essential {
        /// The name of the essential package.
        name: String,
    },

    /// Neither an explicit nor a default version is available.
    #[error("No version specified and no default version available for '{name}'")]
    VersionUnspecified {
        /// The name of the package.
        name: String,
    },

    /// The base OS does not satisfy the package's version constraint.
    #[error(
        "Package '{name}' requires base OS version '{constraint}' but version {os_version} is running"
    )]
    BaseOsIncompatible {
        /// The name of the package.
        name: String,
        /// The package's base-OS constraint.
        constraint: VersionConstraint,
        /// The compatibility version of the running base OS.
        os_version: Version,
    },

    /// The package provides no changelog.
    #[error("No changelog for package '{name}'")]
    NoChangelog {
        /// The name of the package.
        name: String,
    },

    /// A step of the installation transaction failed.
    #[error("Installation failed during {phase}:\n{source}")]
    Installation {
        /// The name of the failed transaction phase.
        phase: &'static str,
        /// The underlying error.
        source: Box<Error>,
    },

    /// A YAML rendering error.
    #[error("Failed to render YAML output:\n{0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A version or constraint error.
    #[error(transparent)]
    Types(#[from] spm_types::Error),

    /// A repository index error.
    #[error(transparent)]
    Db(#[from] spm_db::Error),

    /// A manifest error.
    #[error(transparent)]
    Manifest(#[from] spm_manifest::Error),

    /// A dependency or conflict violation.
    #[error(transparent)]
    Solve(#[from] spm_solve::Error),

    /// A container runtime error.
    #[error(transparent)]
    Container(#[from] spm_container::Error),

    /// A host service integration error.
    #[error(transparent)]
    Service(#[from] spm_service::Error),

    /// A configuration store error.
    #[error(transparent)]
    Registry(#[from] spm_registry::Error),

    /// A shared infrastructure error.
    #[error(transparent)]
    Common(#[from] spm_common::Error),
}

impl Error {
    /// Wraps an error with the name of the transaction phase it occurred in.
    pub(crate) fn in_phase(phase: &'static str, error: impl Into<Error>) -> Self {
        Error::Installation {
            phase,
            source: Box::new(error.into()),
        }
    }

    /// Returns whether `--force` downgrades this error to a warning.
    ///
    /// Only the pre-flight checks are forceable: dependency and conflict
    /// violations, base-OS incompatibility and the installed-state
    /// preconditions. Operational errors are never suppressed.
    pub(crate) fn is_forceable(&self) -> bool {
        matches!(
            self,
            Error::Solve(
                spm_solve::Error::Dependency { .. }
                    | spm_solve::Error::DependencyMissing { .. }
                    | spm_solve::Error::Conflict { .. }
            ) | Error::BaseOsIncompatible { .. }
                | Error::AlreadyInstalled { .. }
                | Error::NotInstalled { .. }
        )
    }
}
