//! Host information provider.
//!
//! Reads the base-OS description shipped at
//! [`paths::SONIC_VERSION_FILE`](crate::paths::SONIC_VERSION_FILE): the ASIC
//! platform identifier (an opaque string used in template rendering) and the
//! base-OS compatibility version checked against each package's
//! `sonic-version` constraint.

use std::{fs, path::Path};

use serde::Deserialize;
use spm_types::{Version, parse_version_lenient};

use crate::Error;

/// The raw on-disk shape of the host version file.
#[derive(Debug, Deserialize)]
struct RawHostInfo {
    asic_type: String,
    sonic_compatibility_version: String,
}

/// Information about the host the package manager runs on.
#[derive(Clone, Debug)]
pub struct HostInfo {
    /// The ASIC platform identifier (e.g. `mellanox`, `broadcom`, `vs`).
    pub platform: String,
    /// The base-OS compatibility version.
    pub compatibility_version: Version,
}

impl HostInfo {
    /// Loads host information from the version YAML at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// carries an invalid compatibility version.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path).map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "reading host version file",
            source,
        })?;
        let raw: RawHostInfo =
            serde_yaml::from_str(&contents).map_err(|error| Error::HostInfo {
                path: path.to_path_buf(),
                reason: error.to_string(),
            })?;
        let compatibility_version =
            parse_version_lenient(&raw.sonic_compatibility_version).map_err(|error| {
                Error::HostInfo {
                    path: path.to_path_buf(),
                    reason: error.to_string(),
                }
            })?;
        Ok(HostInfo {
            platform: raw.asic_type,
            compatibility_version,
        })
    }
}
