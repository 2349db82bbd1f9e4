//! Feature registration and configuration store handling.
//!
//! Packages surface as *features* in the central configuration store. This
//! crate owns the [`ConfigStore`] seam, the `FEATURE` table row lifecycle
//! and the merging of package initial configuration into the store
//! partitions.

mod config;
mod error;
pub mod feature;
pub mod initcfg;

pub use config::{ConfigStore, FieldMap, JsonFileConfigStore, MemoryConfigStore};
pub use error::Error;
