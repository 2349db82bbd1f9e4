//! Shared infrastructure for the SONiC package manager crates.
//!
//! Hosts the subprocess seam used for supervisor and monitor reloads, the
//! template rendering helper, the host info provider and the well-known
//! filesystem locations of the package manager.

mod error;
pub mod fs;
mod host;
pub mod paths;
mod run;
mod template;

pub use error::Error;
pub use host::HostInfo;
pub use run::{CommandRunner, SystemRunner};
pub use template::TemplateRenderer;
