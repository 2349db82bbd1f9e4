//! Validation of the installed package set.

use std::collections::BTreeMap;

use spm_db::RepositoryIndex;
use spm_manifest::Manifest;
use spm_types::{PackageConstraint, Version};

use crate::Error;

/// The relations and version of one package in the installed set.
#[derive(Clone, Debug)]
struct PackageRow {
    dependencies: Vec<PackageConstraint>,
    conflicts: Vec<PackageConstraint>,
    version: Version,
}

/// The set of installed packages with their relations.
///
/// Built from the repository index and mutated with install or uninstall
/// candidates before validation.
#[derive(Clone, Debug, Default)]
pub struct InstalledSet {
    rows: BTreeMap<String, PackageRow>,
}

impl InstalledSet {
    /// Collects the installed entries of `index` with their manifests.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest of an installed entry cannot be
    /// loaded.
    pub fn from_index(index: &RepositoryIndex) -> Result<Self, Error> {
        let mut rows = BTreeMap::new();
        for entry in index.entries() {
            if !entry.is_installed() {
                continue;
            }
            let manifest = index.manifest(entry)?;
            let version = entry
                .version
                .clone()
                .expect("installed entries always carry a version");
            rows.insert(
                entry.name.clone(),
                PackageRow {
                    dependencies: manifest.package.depends.clone(),
                    conflicts: manifest.package.breaks.clone(),
                    version,
                },
            );
        }
        Ok(InstalledSet { rows })
    }

    /// Inserts or replaces a candidate package.
    pub fn insert_candidate(&mut self, name: &str, manifest: &Manifest, version: Version) {
        self.rows.insert(
            name.to_string(),
            PackageRow {
                dependencies: manifest.package.depends.clone(),
                conflicts: manifest.package.breaks.clone(),
                version,
            },
        );
    }

    /// Removes a candidate package; absent candidates are ignored.
    pub fn remove_candidate(&mut self, name: &str) {
        self.rows.remove(name);
    }

    /// Validates every dependency and conflict in the set.
    ///
    /// # Errors
    ///
    /// Returns the first violation found: a dependency on a package that is
    /// not in the set, a dependency matched by an unsatisfying version, or a
    /// conflict matched by an installed version.
    pub fn validate(&self) -> Result<(), Error> {
        for (package, row) in &self.rows {
            for dependency in &row.dependencies {
                let Some(installed) = self.rows.get(&dependency.name) else {
                    return Err(Error::DependencyMissing {
                        package: package.clone(),
                        dependency: dependency.clone(),
                    });
                };
                if !dependency.constraint.allows_all(&installed.version) {
                    return Err(Error::Dependency {
                        package: package.clone(),
                        dependency: dependency.clone(),
                        installed: installed.version.clone(),
                    });
                }
            }
            for conflict in &row.conflicts {
                let Some(installed) = self.rows.get(&conflict.name) else {
                    continue;
                };
                if conflict.constraint.allows_all(&installed.version) {
                    return Err(Error::Conflict {
                        package: package.clone(),
                        conflict: conflict.clone(),
                        installed: installed.version.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Checks that installing `(name, manifest, version)` keeps every
/// dependency satisfied and violates no conflict.
///
/// # Errors
///
/// Returns an error if collecting the installed set fails or the candidate
/// introduces a violation.
pub fn check_install(
    index: &RepositoryIndex,
    name: &str,
    manifest: &Manifest,
    version: Version,
) -> Result<(), Error> {
    let mut set = InstalledSet::from_index(index)?;
    set.insert_candidate(name, manifest, version);
    set.validate()
}

/// Checks that uninstalling `name` leaves every remaining dependency
/// satisfied.
///
/// # Errors
///
/// Returns an error if collecting the installed set fails or a remaining
/// package depends on the candidate.
pub fn check_uninstall(index: &RepositoryIndex, name: &str) -> Result<(), Error> {
    let mut set = InstalledSet::from_index(index)?;
    set.remove_candidate(name);
    set.validate()
}
