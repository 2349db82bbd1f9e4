//! The package manifest.
//!
//! Every SONiC package image carries a manifest in its metadata directory
//! describing the service identity, version constraints, dependencies,
//! conflicts, initial configuration and container integration directives.
//! Images without a manifest are treated as plain Docker images and get a
//! synthesized default.

mod error;
mod manifest;

pub use error::Error;
pub use manifest::{
    ContainerSection,
    InitialConfig,
    Manifest,
    Mount,
    PackageSection,
    Process,
    ServiceSection,
};
