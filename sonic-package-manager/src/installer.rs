//! The transactional install orchestrator.
//!
//! Installation is a fixed sequence of steps; each completed step pushes a
//! compensating undo onto a stack. On any failure the stack unwinds in
//! reverse, the system returns to its pre-install state and the original
//! error is re-raised. Uninstallation runs the removal steps without
//! compensation; every step tolerates already-removed state, so a partial
//! uninstall can be retried.

use std::collections::BTreeMap;

use log::{info, warn};
use spm_common::HostInfo;
use spm_container::{ContainerRuntime, image_reference, metadata, remove_package_images};
use spm_db::{RepositoryEntry, RepositoryIndex};
use spm_manifest::Manifest;
use spm_registry::{
    ConfigStore,
    feature::{self, DeregisterPolicy},
    initcfg::{self, HOST_PARTITION},
};
use spm_service::{MonitIntegrator, ServiceIntegrator};
use spm_types::Version;

use crate::Error;

/// A compensating step, pushed as its forward step succeeds.
#[derive(Debug)]
enum UndoStep {
    /// Remove the pulled image tags and their containers.
    RemoveImages,
    /// Remove the host metadata folder.
    RemoveMetadata,
    /// Remove the generated service artifacts.
    UninstallService(Box<Manifest>),
    /// Remove the monitor fragment.
    RemoveMonit(String),
    /// Remove the feature row.
    DeregisterFeature(String),
}

/// The package manager: composes the repository index, the container
/// runtime, the host integrators and the configuration stores into
/// transactional install and uninstall operations.
///
/// The caller is expected to hold the exclusive index lock for the whole
/// lifetime of a mutating operation.
#[derive(Debug)]
pub struct PackageManager<'a> {
    index: RepositoryIndex,
    runtime: &'a dyn ContainerRuntime,
    service: ServiceIntegrator<'a>,
    monit: MonitIntegrator<'a>,
    stores: BTreeMap<String, Box<dyn ConfigStore>>,
    host: HostInfo,
    deregister_policy: DeregisterPolicy,
}

impl<'a> PackageManager<'a> {
    /// Creates a package manager over the given collaborators.
    ///
    /// `asic_stores` holds the per-ASIC configuration store partitions of
    /// multi-ASIC platforms and stays empty otherwise.
    pub fn new(
        index: RepositoryIndex,
        runtime: &'a dyn ContainerRuntime,
        service: ServiceIntegrator<'a>,
        monit: MonitIntegrator<'a>,
        host_store: Box<dyn ConfigStore>,
        asic_stores: BTreeMap<String, Box<dyn ConfigStore>>,
        host: HostInfo,
    ) -> Self {
        let mut stores = asic_stores;
        stores.insert(HOST_PARTITION.to_string(), host_store);
        PackageManager {
            index,
            runtime,
            service,
            monit,
            stores,
            host,
            deregister_policy: DeregisterPolicy::default(),
        }
    }

    /// Overrides the feature deregistration policy.
    pub fn deregister_policy(mut self, policy: DeregisterPolicy) -> Self {
        self.deregister_policy = policy;
        self
    }

    /// The repository index the manager operates on.
    pub fn index(&self) -> &RepositoryIndex {
        &self.index
    }

    /// The configuration store of `partition`, if present.
    pub fn config_store(&self, partition: &str) -> Option<&dyn ConfigStore> {
        self.stores.get(partition).map(|store| &**store)
    }

    /// The mutable configuration store of `partition`, if present.
    pub fn config_store_mut(&mut self, partition: &str) -> Option<&mut dyn ConfigStore> {
        if let Some(store) = self.stores.get_mut(partition) {
            Some(&mut **store)
        } else {
            None
        }
    }

    /// Installs the package of repository `name`.
    ///
    /// Without an explicit `version` the entry's default version is used.
    /// With `force`, failing pre-flight checks (installed state, base-OS
    /// compatibility, dependencies and conflicts) degrade to warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is unknown, no version can be
    /// selected, a check fails without `force`, or any transaction step
    /// fails. In the latter case all completed steps are compensated before
    /// the original error is returned.
    pub fn install(
        &mut self,
        name: &str,
        version: Option<Version>,
        force: bool,
    ) -> Result<(), Error> {
        let entry = self.index.get(name)?.clone();
        let Some(version) = version.or_else(|| entry.default_version.clone()) else {
            return Err(Error::VersionUnspecified {
                name: name.to_string(),
            });
        };

        info!("{}", install_request_message(name, &version, force));
        allow_force(check_not_installed(&entry), force)?;

        let mut undo = Vec::new();
        if let Err(error) = self.install_transaction(&entry, &version, force, &mut undo) {
            warn!("Installation of {name} failed, rolling back");
            self.compensate(undo, &entry, &version);
            return Err(error);
        }

        info!("Package {name} is successfully installed!");
        Ok(())
    }

    /// Uninstalls the package of repository `name`.
    ///
    /// There is no compensation: a failure leaves a partial state the
    /// operator resolves by re-running with `force`, which both skips the
    /// checks and tolerates missing package metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is unknown or essential, a check
    /// fails without `force`, or a removal step fails.
    pub fn uninstall(&mut self, name: &str, force: bool) -> Result<(), Error> {
        let entry = self.index.get(name)?.clone();

        info!("Request to uninstall {name}");
        allow_force(check_installed(&entry), force)?;
        if entry.essential {
            return Err(Error::Essential {
                name: name.to_string(),
            });
        }
        allow_force(
            spm_solve::check_uninstall(&self.index, name).map_err(Error::from),
            force,
        )?;

        let manifest = match self.index.manifest(&entry) {
            Ok(manifest) => manifest,
            Err(error @ spm_db::Error::Corrupt { .. }) if force => {
                warn!("Ignoring error: {error}");
                Manifest::default_for(name)
            }
            Err(error) => return Err(error.into()),
        };
        let feature_name = manifest.service.name.clone();

        let deregister_policy = self.deregister_policy;
        feature::deregister(self.host_store(), &feature_name, deregister_policy)
            .map_err(|error| Error::in_phase("feature deregistration", error))?;
        self.monit
            .uninstall(&feature_name)
            .map_err(|error| Error::in_phase("monitor integration", error))?;
        self.service
            .uninstall(&manifest)
            .map_err(|error| Error::in_phase("service integration", error))?;
        metadata::uninstall_metadata(&self.index.package_metadata_dir(name))
            .map_err(|error| Error::in_phase("metadata removal", error))?;
        if let Some(version) = entry.version.clone() {
            remove_package_images(self.runtime, &entry.repository, &version)
                .map_err(|error| Error::in_phase("image removal", error))?;
        }

        let mut updated = entry;
        updated.set_uninstalled();
        self.index
            .update(updated)
            .map_err(|error| Error::in_phase("index persistence", error))?;

        info!("Package {name} successfully uninstalled!");
        Ok(())
    }

    /// Runs the forward steps of an installation.
    fn install_transaction(
        &mut self,
        entry: &RepositoryEntry,
        version: &Version,
        force: bool,
        undo: &mut Vec<UndoStep>,
    ) -> Result<(), Error> {
        let name = &entry.name;
        let tag = version.to_string();

        undo.push(UndoStep::RemoveImages);
        info!("Pulling image {}", entry.repository);
        self.runtime
            .pull(&entry.repository, &tag)
            .map_err(|error| Error::in_phase("image pull", error))?;
        self.runtime
            .tag(&image_reference(&entry.repository, &tag), &entry.repository, "latest")
            .map_err(|error| Error::in_phase("image pull", error))?;

        let metadata_dir = self.index.package_metadata_dir(name);
        undo.push(UndoStep::RemoveMetadata);
        metadata::install_metadata(self.runtime, &entry.repository, &metadata_dir)
            .map_err(|error| Error::in_phase("metadata extraction", error))?;
        let manifest = Manifest::from_metadata_dir(&metadata_dir, name)
            .map_err(|error| Error::in_phase("metadata extraction", error))?;

        allow_force(self.check_base_os(name, &manifest), force)?;
        allow_force(
            spm_solve::check_install(&self.index, name, &manifest, version.clone())
                .map_err(Error::from),
            force,
        )?;

        undo.push(UndoStep::UninstallService(Box::new(manifest.clone())));
        self.service
            .install(&self.index, entry, &manifest)
            .map_err(|error| Error::in_phase("service integration", error))?;

        undo.push(UndoStep::RemoveMonit(manifest.service.name.clone()));
        self.monit
            .install(&manifest)
            .map_err(|error| Error::in_phase("monitor integration", error))?;

        undo.push(UndoStep::DeregisterFeature(manifest.service.name.clone()));
        feature::register(self.host_store(), &manifest)
            .map_err(|error| Error::in_phase("feature registration", error))?;

        let mut updated = entry.clone();
        updated.set_installed(version.clone());
        self.index
            .update(updated)
            .map_err(|error| Error::in_phase("index persistence", error))?;

        initcfg::load_initial_config(&mut self.stores, &manifest)
            .map_err(|error| Error::in_phase("initial configuration", error))?;

        Ok(())
    }

    /// Unwinds the undo stack in reverse order.
    ///
    /// Compensation never masks the original error: failures are logged and
    /// the unwinding continues.
    fn compensate(&mut self, undo: Vec<UndoStep>, entry: &RepositoryEntry, version: &Version) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                UndoStep::RemoveImages => {
                    remove_package_images(self.runtime, &entry.repository, version)
                        .map_err(Error::from)
                }
                UndoStep::RemoveMetadata => {
                    metadata::uninstall_metadata(&self.index.package_metadata_dir(&entry.name))
                        .map_err(Error::from)
                }
                UndoStep::UninstallService(manifest) => {
                    self.service.uninstall(manifest).map_err(Error::from)
                }
                UndoStep::RemoveMonit(feature_name) => {
                    self.monit.uninstall(feature_name).map_err(Error::from)
                }
                UndoStep::DeregisterFeature(feature_name) => feature::deregister(
                    self.host_store(),
                    feature_name,
                    DeregisterPolicy::Unconditional,
                )
                .map_err(Error::from),
            };
            if let Err(error) = result {
                warn!("Rollback step {step:?} failed: {error}");
            }
        }
    }

    /// Checks the base-OS compatibility constraint of a package.
    fn check_base_os(&self, name: &str, manifest: &Manifest) -> Result<(), Error> {
        let constraint = &manifest.package.sonic_version;
        if !constraint.allows_all(&self.host.compatibility_version) {
            return Err(Error::BaseOsIncompatible {
                name: name.to_string(),
                constraint: constraint.clone(),
                os_version: self.host.compatibility_version.clone(),
            });
        }
        Ok(())
    }

    /// The host partition configuration store.
    fn host_store(&mut self) -> &mut dyn ConfigStore {
        self.stores
            .get_mut(HOST_PARTITION)
            .expect("the host partition is inserted on construction")
            .as_mut()
    }
}

/// Downgrades forceable check failures to warnings when `force` is set.
fn allow_force(result: Result<(), Error>, force: bool) -> Result<(), Error> {
    match result {
        Err(error) if force && error.is_forceable() => {
            warn!("Ignoring error: {error}");
            Ok(())
        }
        other => other,
    }
}

/// The pre-install precondition: the package must not be installed yet.
fn check_not_installed(entry: &RepositoryEntry) -> Result<(), Error> {
    if entry.is_installed() {
        return Err(Error::AlreadyInstalled {
            name: entry.name.clone(),
        });
    }
    Ok(())
}

/// The pre-uninstall precondition: the package must be installed.
fn check_installed(entry: &RepositoryEntry) -> Result<(), Error> {
    if !entry.is_installed() {
        return Err(Error::NotInstalled {
            name: entry.name.clone(),
        });
    }
    Ok(())
}

/// The log line announcing an installation request.
fn install_request_message(name: &str, version: &Version, force: bool) -> String {
    let force = if force { " force" } else { "" };
    format!("Requested{force} installation of {name} version {version}")
}
