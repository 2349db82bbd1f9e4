//! Dependency and conflict checking for the SONiC package manager.
//!
//! The checker is a static validation over the set of installed packages:
//! every dependency of every installed package must be satisfied by an
//! installed version, and no conflict may be satisfied by one. Install and
//! uninstall candidates are checked by inserting into or removing from that
//! set before validating it.

mod error;
mod solver;

pub use error::Error;
pub use solver::{InstalledSet, check_install, check_uninstall};
