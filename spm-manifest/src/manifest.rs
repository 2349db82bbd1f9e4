//! The manifest model and its loading rules.

use std::{
    collections::BTreeMap,
    fs,
    path::Path,
};

use log::warn;
use serde::{Deserialize, Serialize};
use spm_types::{PackageConstraint, Version, VersionConstraint};

use crate::Error;

/// The manifest file names probed inside a package metadata directory, in
/// probing order.
const MANIFEST_LOCATIONS: [&str; 3] = ["manifest.json", "manifest.yml", "manifest.yaml"];

/// Initial configuration shipped by a package: table → key → fields.
pub type InitialConfig = BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>;

/// The `package` section: versioning, relations and initial configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackageSection {
    /// The base-OS compatibility constraint; any version when omitted.
    #[serde(default)]
    pub sonic_version: VersionConstraint,
    /// Packages this package depends on.
    #[serde(default)]
    pub depends: Vec<PackageConstraint>,
    /// Packages this package conflicts with.
    #[serde(default)]
    pub breaks: Vec<PackageConstraint>,
    /// Per-version changelog lines, ordered by version.
    #[serde(default)]
    pub changelog: BTreeMap<Version, Vec<String>>,
    /// Configuration to merge into the config store on installation.
    #[serde(default)]
    pub initial_config: Option<InitialConfig>,
}

/// The `service` section: feature identity and unit ordering directives.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSection {
    /// The feature name this package provides.
    pub name: String,
    /// Whether the service runs once per ASIC on multi-ASIC platforms.
    #[serde(default)]
    pub asic_service: bool,
    /// Whether the service runs on the host partition.
    #[serde(default = "default_true")]
    pub host_service: bool,
    /// The user the service runs as.
    #[serde(default = "default_user")]
    pub user: String,
    /// Units this service requires.
    #[serde(default)]
    pub requires: Vec<String>,
    /// Units this service is requisite on.
    #[serde(default)]
    pub requisite: Vec<String>,
    /// Units this service orders after.
    #[serde(default)]
    pub after: Vec<String>,
    /// Units this service orders before.
    #[serde(default)]
    pub before: Vec<String>,
    /// Targets that want this service.
    #[serde(default)]
    pub wanted_by: Vec<String>,
    /// Base features this feature is a reverse-dependency of.
    #[serde(default)]
    pub dependent_of: Vec<String>,
    /// An optional companion feature.
    #[serde(default)]
    pub peer: Option<String>,
}

/// A bind mount of the package container.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Mount {
    /// The mount type (`bind`, `tmpfs`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// The mount source.
    pub source: String,
    /// The mount target inside the container.
    pub target: String,
}

/// The `container` section: options for the container control script.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ContainerSection {
    /// Whether the container runs privileged.
    #[serde(default)]
    pub privileged: bool,
    /// Volumes passed as `-v`.
    #[serde(default)]
    pub volumes: Vec<String>,
    /// Mounts passed as `--mount`.
    #[serde(default)]
    pub mounts: Vec<Mount>,
    /// Environment variables passed as `-e`.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Whether to suppress the default tmpfs volume.
    #[serde(default)]
    pub no_default_tmpfs_volume: bool,
}

/// A process monitored by the host process monitor.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Process {
    /// The process name as shown by the monitor.
    pub name: String,
    /// The command line to match the process by.
    pub command: String,
}

/// A package manifest.
///
/// Loaded from the first existing file among `manifest.json`, `manifest.yml`
/// and `manifest.yaml` in the package metadata directory.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Manifest {
    /// Versioning, relations and initial configuration.
    #[serde(default)]
    pub package: PackageSection,
    /// Feature identity and unit ordering directives.
    pub service: ServiceSection,
    /// Options for the container control script.
    #[serde(default)]
    pub container: ContainerSection,
    /// Processes watched by the host process monitor; no monitor fragment
    /// is generated when empty.
    #[serde(default)]
    pub processes: Vec<Process>,
}

fn default_true() -> bool {
    true
}

fn default_user() -> String {
    "root".to_string()
}

impl Manifest {
    /// Loads the manifest from a package metadata directory.
    ///
    /// Probes `manifest.json`, `manifest.yml` and `manifest.yaml` in order.
    /// When none exists, a synthesized default is returned: the feature name
    /// equals the package name and the package is treated as an arbitrary
    /// Docker image running on the host (host-service, not asic-service, no
    /// relations).
    ///
    /// # Errors
    ///
    /// Returns an error only if an existing manifest file cannot be read or
    /// parsed; a missing manifest is not an error.
    pub fn from_metadata_dir(dir: &Path, package_name: &str) -> Result<Self, Error> {
        for location in MANIFEST_LOCATIONS {
            let path = dir.join(location);
            if !path.exists() {
                continue;
            }
            let contents = fs::read_to_string(&path).map_err(|source| Error::IoPath {
                path: path.clone(),
                context: "reading manifest",
                source,
            })?;
            return if location.ends_with(".json") {
                serde_json::from_str(&contents).map_err(|source| Error::ParseJson {
                    path: path.clone(),
                    source,
                })
            } else {
                serde_yaml::from_str(&contents).map_err(|source| Error::ParseYaml {
                    path: path.clone(),
                    source,
                })
            };
        }

        warn!("Failed to locate manifest file for {package_name}, using default manifest");
        Ok(Manifest::default_for(package_name))
    }

    /// The synthesized default manifest for a package without one.
    pub fn default_for(package_name: &str) -> Self {
        Manifest {
            package: PackageSection::default(),
            service: ServiceSection {
                name: package_name.to_string(),
                asic_service: false,
                host_service: true,
                user: default_user(),
                requires: Vec::new(),
                requisite: Vec::new(),
                after: Vec::new(),
                before: Vec::new(),
                wanted_by: Vec::new(),
                dependent_of: Vec::new(),
                peer: None,
            },
            container: ContainerSection::default(),
            processes: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use testresult::TestResult;

    use super::*;

    const MANIFEST_YAML: &str = r#"
package:
  sonic-version: ">=1.0.0"
  depends:
    - "swss >=1.0.0 <2.0.0"
  breaks:
    - "legacy-agent <3.0.0"
  changelog:
    "1.0.0":
      - "Initial release"
    "1.1.0":
      - "Added counters"
      - "Fixed restart on ASIC reset"
service:
  name: featured
  asic-service: true
  host-service: false
  requires:
    - database.service
  dependent-of:
    - swss
container:
  privileged: true
  volumes:
    - "/etc/sonic:/etc/sonic:ro"
  mounts:
    - type: bind
      source: /var/log
      target: /var/log
  environment:
    DEBUG: "1"
processes:
  - name: featured
    command: /usr/bin/featured
"#;

    #[test]
    fn parses_full_yaml_manifest() -> TestResult {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("manifest.yml"), MANIFEST_YAML)?;

        let manifest = Manifest::from_metadata_dir(tmp.path(), "featured")?;
        assert_eq!(manifest.service.name, "featured");
        assert!(manifest.service.asic_service);
        assert!(!manifest.service.host_service);
        assert_eq!(manifest.service.user, "root");
        assert_eq!(manifest.package.depends.len(), 1);
        assert_eq!(manifest.package.depends[0].name, "swss");
        assert_eq!(manifest.package.breaks[0].name, "legacy-agent");
        assert_eq!(manifest.container.volumes, ["/etc/sonic:/etc/sonic:ro"]);
        assert_eq!(manifest.container.mounts[0].kind, "bind");
        assert_eq!(manifest.processes[0].name, "featured");

        // Changelog versions iterate in ascending semver order.
        let versions: Vec<String> = manifest
            .package
            .changelog
            .keys()
            .map(ToString::to_string)
            .collect();
        assert_eq!(versions, ["1.0.0", "1.1.0"]);
        Ok(())
    }

    #[test]
    fn json_manifest_is_preferred_over_yaml() -> TestResult {
        let tmp = tempfile::tempdir()?;
        fs::write(
            tmp.path().join("manifest.json"),
            r#"{"service": {"name": "from-json"}}"#,
        )?;
        fs::write(tmp.path().join("manifest.yml"), "service:\n  name: from-yaml\n")?;

        let manifest = Manifest::from_metadata_dir(tmp.path(), "pkg")?;
        assert_eq!(manifest.service.name, "from-json");
        Ok(())
    }

    #[test]
    fn missing_manifest_synthesizes_default() -> TestResult {
        let tmp = tempfile::tempdir()?;

        let manifest = Manifest::from_metadata_dir(tmp.path(), "plain-image")?;
        assert_eq!(manifest.service.name, "plain-image");
        assert!(manifest.service.host_service);
        assert!(!manifest.service.asic_service);
        assert!(manifest.package.depends.is_empty());
        assert!(manifest.package.breaks.is_empty());
        assert!(manifest.package.sonic_version.is_any());
        Ok(())
    }

    #[rstest]
    #[case("manifest.json", "{not json")]
    #[case("manifest.yml", "service: [unterminated")]
    fn broken_existing_manifest_is_an_error(
        #[case] name: &str,
        #[case] contents: &str,
    ) -> TestResult {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join(name), contents)?;

        assert!(Manifest::from_metadata_dir(tmp.path(), "pkg").is_err());
        Ok(())
    }

    #[test]
    fn defaults_apply_to_minimal_manifest() -> TestResult {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("manifest.yml"), "service:\n  name: tiny\n")?;

        let manifest = Manifest::from_metadata_dir(tmp.path(), "tiny")?;
        assert!(manifest.service.host_service);
        assert!(!manifest.service.asic_service);
        assert!(!manifest.container.privileged);
        assert!(manifest.package.sonic_version.is_any());
        assert!(manifest.processes.is_empty());
        Ok(())
    }
}
