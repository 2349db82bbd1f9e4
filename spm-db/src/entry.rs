//! Repository entries.

use serde::{Deserialize, Serialize};
use spm_types::Version;
use strum::Display;

/// The installation state of a repository entry.
#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum InstallStatus {
    /// The package from this repository is installed.
    #[serde(rename = "installed")]
    #[strum(serialize = "installed")]
    Installed,
    /// The package from this repository is not installed.
    #[default]
    #[serde(rename = "not-installed")]
    #[strum(serialize = "not-installed")]
    NotInstalled,
}

/// One repository in the persistent index.
///
/// The `status = installed ⇔ version is set` invariant is maintained by
/// [`RepositoryEntry::set_installed`] and
/// [`RepositoryEntry::set_uninstalled`] and checked when the index is
/// loaded.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepositoryEntry {
    /// The unique repository name.
    #[serde(skip)]
    pub name: String,
    /// The container image reference packages are pulled from.
    pub repository: String,
    /// An optional human readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The version installed when none is requested explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<Version>,
    /// Essential entries cannot be uninstalled or removed.
    #[serde(default)]
    pub essential: bool,
    /// The installation state.
    #[serde(default)]
    pub status: InstallStatus,
    /// The installed version; present iff `status` is `installed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl RepositoryEntry {
    /// Creates a new, not yet installed entry.
    pub fn new(name: &str, repository: &str) -> Self {
        RepositoryEntry {
            name: name.to_string(),
            repository: repository.to_string(),
            description: None,
            default_version: None,
            essential: false,
            status: InstallStatus::NotInstalled,
            version: None,
        }
    }

    /// Returns whether the package from this repository is installed.
    pub fn is_installed(&self) -> bool {
        self.status == InstallStatus::Installed
    }

    /// Marks the entry installed at `version`.
    pub fn set_installed(&mut self, version: Version) {
        self.status = InstallStatus::Installed;
        self.version = Some(version);
    }

    /// Marks the entry not installed and clears the installed version.
    pub fn set_uninstalled(&mut self) {
        self.status = InstallStatus::NotInstalled;
        self.version = None;
    }

    /// The status string shown to operators.
    ///
    /// Essential entries show as `Built-In` since they ship with the base
    /// image and cannot be uninstalled.
    pub fn status_text(&self) -> &'static str {
        if self.essential {
            "Built-In"
        } else if self.is_installed() {
            "Installed"
        } else {
            "Not Installed"
        }
    }
}
