//! Host service integration for SONiC packages.
//!
//! Installing a package integrates its feature with the host: systemd unit
//! files, a service management script, a container control script,
//! reverse-dependency files consulted by the base service init scripts, and
//! a process monitor fragment. Uninstalling removes them again.

mod dependent;
mod error;
mod monit;
mod systemd;

pub use error::Error;
pub use monit::MonitIntegrator;
pub use systemd::ServiceIntegrator;
