//! Core types shared across the SONiC package manager crates.
//!
//! Provides semantic versions, version constraint expressions and package
//! constraints, which are used for package dependencies, conflicts and
//! base-OS compatibility checks.

mod constraint;
mod error;
mod version;

pub use constraint::{Comparison, PackageConstraint, VersionConstraint};
pub use error::Error;
pub use version::{Version, parse_version, parse_version_lenient};
