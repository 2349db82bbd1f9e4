//! End-to-end install and uninstall scenarios against mocked host
//! collaborators.

use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    fs,
    path::PathBuf,
};

use sonic_package_manager::{Error, PackageManager};
use spm_common::{CommandRunner, HostInfo};
use spm_container::{ContainerRuntime, ContainerSummary, ImageSummary};
use spm_db::RepositoryIndex;
use spm_registry::{ConfigStore, MemoryConfigStore, feature::FEATURE_TABLE};
use spm_service::{MonitIntegrator, ServiceIntegrator};
use spm_types::Version;
use testresult::TestResult;

/// Builds the metadata tar stream of a package image the way the runtime
/// serves it: the metadata folder itself is the top-level entry.
fn metadata_tar(manifest_yaml: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_yaml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            "sonic-package/manifest.yml",
            manifest_yaml.as_bytes(),
        )
        .unwrap();
    builder.into_inner().unwrap()
}

#[derive(Debug, Default)]
struct RuntimeState {
    /// Image id → repo tags.
    images: BTreeMap<String, BTreeSet<String>>,
    /// Running helper containers as (id, image).
    containers: Vec<(String, String)>,
    pulls: Vec<String>,
    next_container: usize,
}

/// A container runtime double serving canned metadata archives.
#[derive(Debug, Default)]
struct MockRuntime {
    state: RefCell<RuntimeState>,
    /// Repository → metadata tar served from its `latest` image.
    metadata: BTreeMap<String, Vec<u8>>,
    fail_pull: bool,
}

impl MockRuntime {
    fn with_metadata(repository: &str, manifest_yaml: &str) -> Self {
        let mut runtime = MockRuntime::default();
        runtime
            .metadata
            .insert(repository.to_string(), metadata_tar(manifest_yaml));
        runtime
    }

    fn has_tag(&self, repo_tag: &str) -> bool {
        self.state
            .borrow()
            .images
            .values()
            .any(|tags| tags.contains(repo_tag))
    }

    fn pulls(&self) -> Vec<String> {
        self.state.borrow().pulls.clone()
    }

    fn running_containers(&self) -> usize {
        self.state.borrow().containers.len()
    }
}

impl ContainerRuntime for MockRuntime {
    fn pull(&self, repository: &str, tag: &str) -> Result<(), spm_container::Error> {
        if self.fail_pull {
            return Err(spm_container::Error::Runtime {
                context: format!("pulling {repository}:{tag}"),
                details: "registry unreachable".to_string(),
            });
        }
        let mut state = self.state.borrow_mut();
        let reference = format!("{repository}:{tag}");
        state.pulls.push(reference.clone());
        state
            .images
            .entry(format!("sha256:{reference}"))
            .or_default()
            .insert(reference);
        Ok(())
    }

    fn tag(&self, image: &str, repository: &str, new_tag: &str) -> Result<(), spm_container::Error> {
        let mut state = self.state.borrow_mut();
        let Some(tags) = state
            .images
            .values_mut()
            .find(|tags| tags.contains(image))
        else {
            return Err(spm_container::Error::Runtime {
                context: format!("tagging {image}"),
                details: "no such image".to_string(),
            });
        };
        tags.insert(format!("{repository}:{new_tag}"));
        Ok(())
    }

    fn remove_image(&self, image: &str, _force: bool) -> Result<(), spm_container::Error> {
        let mut state = self.state.borrow_mut();
        for tags in state.images.values_mut() {
            tags.remove(image);
        }
        state.images.retain(|_, tags| !tags.is_empty());
        Ok(())
    }

    fn list_containers(&self) -> Result<Vec<ContainerSummary>, spm_container::Error> {
        Ok(self
            .state
            .borrow()
            .containers
            .iter()
            .map(|(id, image)| ContainerSummary {
                id: id.clone(),
                image: image.clone(),
            })
            .collect())
    }

    fn list_images(&self) -> Result<Vec<ImageSummary>, spm_container::Error> {
        Ok(self
            .state
            .borrow()
            .images
            .iter()
            .map(|(id, tags)| ImageSummary {
                id: id.clone(),
                repo_tags: tags.iter().cloned().collect(),
            })
            .collect())
    }

    fn run_detached(
        &self,
        image: &str,
        _entrypoint: &str,
        _arguments: &[&str],
    ) -> Result<String, spm_container::Error> {
        let mut state = self.state.borrow_mut();
        let id = format!("container-{}", state.next_container);
        state.next_container += 1;
        state.containers.push((id.clone(), image.to_string()));
        Ok(id)
    }

    fn copy_from(&self, container_id: &str, _path: &str) -> Result<Vec<u8>, spm_container::Error> {
        let state = self.state.borrow();
        let image = state
            .containers
            .iter()
            .find(|(id, _)| id == container_id)
            .map(|(_, image)| image.clone())
            .ok_or_else(|| spm_container::Error::Runtime {
                context: "copying from container".to_string(),
                details: "no such container".to_string(),
            })?;
        let repository = image.strip_suffix(":latest").unwrap_or(&image);
        self.metadata
            .get(repository)
            .cloned()
            .ok_or_else(|| spm_container::Error::Runtime {
                context: "copying package metadata".to_string(),
                details: "path does not exist".to_string(),
            })
    }

    fn remove_container(&self, container_id: &str, _force: bool) -> Result<(), spm_container::Error> {
        self.state
            .borrow_mut()
            .containers
            .retain(|(id, _)| id != container_id);
        Ok(())
    }
}

/// Records host commands instead of running them.
#[derive(Debug, Default)]
struct RecordingRunner {
    commands: RefCell<Vec<String>>,
}

impl CommandRunner for RecordingRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<(), spm_common::Error> {
        self.commands
            .borrow_mut()
            .push(format!("{program} {}", args.join(" ")));
        Ok(())
    }
}

/// The on-disk layout shared by the scenarios.
struct Host {
    tmp: tempfile::TempDir,
}

impl Host {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        for dir in ["spm", "templates", "units", "mgmt", "ctl", "etc", "monit"] {
            fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        fs::write(
            tmp.path().join("templates/sonic-service.hbs"),
            "Description={{description}}\nMulti={{multi_instance}}\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("templates/service-mgmt.sh.hbs"),
            "SERVICE={{service_name}}\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("templates/docker_image_ctl.hbs"),
            "IMAGE={{docker_image_name}} OPT={{docker_image_run_opt}}\n",
        )
        .unwrap();
        fs::write(
            tmp.path().join("templates/monit.conf.hbs"),
            "# {{feature}}\n",
        )
        .unwrap();
        Host { tmp }
    }

    fn dir(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    fn base_dir(&self) -> PathBuf {
        self.dir("spm")
    }

    fn index(&self) -> RepositoryIndex {
        RepositoryIndex::open(&self.base_dir()).unwrap()
    }

    /// Seeds an installed package directly into the index and metadata dir.
    fn seed_installed(&self, name: &str, version: &str, manifest_yaml: &str) {
        let mut index = self.index();
        if !index.has(name) {
            index
                .add(name, &format!("registry/{name}"), None, None)
                .unwrap();
        }
        let metadata = index.package_metadata_dir(name);
        fs::create_dir_all(&metadata).unwrap();
        fs::write(metadata.join("manifest.yml"), manifest_yaml).unwrap();
        let mut entry = index.get(name).unwrap().clone();
        entry.set_installed(version.parse().unwrap());
        index.update(entry).unwrap();
    }

    fn manager<'a>(
        &self,
        runtime: &'a MockRuntime,
        runner: &'a RecordingRunner,
        asic_partitions: &[&str],
    ) -> PackageManager<'a> {
        let service = ServiceIntegrator::new(runner, "mellanox")
            .templates_dir(self.dir("templates"))
            .unit_dir(self.dir("units"))
            .mgmt_script_dir(self.dir("mgmt"))
            .ctl_script_dir(self.dir("ctl"))
            .etc_sonic_dir(self.dir("etc"));
        let monit = MonitIntegrator::new(runner)
            .templates_dir(self.dir("templates"))
            .conf_dir(self.dir("monit"));
        let asic_stores: BTreeMap<String, Box<dyn ConfigStore>> = asic_partitions
            .iter()
            .map(|partition| {
                (
                    partition.to_string(),
                    Box::new(MemoryConfigStore::new()) as Box<dyn ConfigStore>,
                )
            })
            .collect();
        PackageManager::new(
            self.index(),
            runtime,
            service,
            monit,
            Box::new(MemoryConfigStore::new()),
            asic_stores,
            HostInfo {
                platform: "mellanox".to_string(),
                compatibility_version: Version::new(1, 0, 0),
            },
        )
    }
}

fn feature_row(manager: &PackageManager<'_>, partition: &str, feature: &str) -> BTreeMap<String, String> {
    manager
        .config_store(partition)
        .unwrap()
        .get_entry(FEATURE_TABLE, feature)
}

const FOO_MANIFEST: &str = "service:\n  name: foo\n";

#[test]
fn install_integrates_a_host_service_package() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index()
        .add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", Some(Version::new(1, 2, 0)), false)?;

    // Image pulled and tagged latest; no helper container left behind.
    assert_eq!(runtime.pulls(), ["registry/foo:1.2.0"]);
    assert!(runtime.has_tag("registry/foo:latest"));
    assert_eq!(runtime.running_containers(), 0);

    // Metadata copied onto the host.
    assert!(host.base_dir().join("foo/manifest.yml").exists());

    // Generated service artifacts; no multi-instance unit for a host service.
    assert!(host.dir("units").join("foo.service").exists());
    assert!(!host.dir("units").join("foo@.service").exists());
    assert!(host.dir("mgmt").join("foo.sh").exists());
    assert!(host.dir("ctl").join("foo.sh").exists());

    // The feature row carries the defaults and scope flags.
    let row = feature_row(&manager, "host", "foo");
    assert_eq!(row.get("state").unwrap(), "disabled");
    assert_eq!(row.get("auto_restart").unwrap(), "enabled");
    assert_eq!(row.get("high_mem_alert").unwrap(), "disabled");
    assert_eq!(row.get("has_global_scope").unwrap(), "True");
    assert_eq!(row.get("has_per_asic_scope").unwrap(), "False");
    assert_eq!(row.get("has_timer").unwrap(), "False");

    // The index is persisted with status installed.
    let reloaded = host.index();
    let entry = reloaded.get("foo")?;
    assert!(entry.is_installed());
    assert_eq!(entry.version, Some(Version::new(1, 2, 0)));

    // The supervisor was reloaded.
    assert!(
        runner
            .commands
            .borrow()
            .contains(&"systemctl daemon-reload".to_string())
    );
    Ok(())
}

#[test]
fn install_uses_the_default_version() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index()
        .add("foo", "registry/foo", None, Some(Version::new(1, 2, 0)))?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", None, false)?;

    assert_eq!(runtime.pulls(), ["registry/foo:1.2.0"]);
    Ok(())
}

#[test]
fn install_without_any_version_fails() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager.install("foo", None, false).unwrap_err();
    assert!(matches!(error, Error::VersionUnspecified { name } if name == "foo"));
    assert!(runtime.pulls().is_empty());
    Ok(())
}

#[test]
fn unsatisfied_dependency_rolls_back_all_side_effects() -> TestResult {
    let host = Host::new();
    host.seed_installed("bar", "1.9.0", "service:\n  name: bar\n");
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "package:\n  depends:\n    - \"bar >=2.0.0\"\nservice:\n  name: foo\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), false)
        .unwrap_err();

    match error {
        Error::Solve(spm_solve::Error::Dependency {
            package,
            dependency,
            installed,
        }) => {
            assert_eq!(package, "foo");
            assert_eq!(dependency.to_string(), "bar >=2.0.0");
            assert_eq!(installed.to_string(), "1.9.0");
        }
        other => panic!("expected a dependency error, got {other:?}"),
    }

    // Rollback removed the pulled image and the extracted metadata.
    assert!(!runtime.has_tag("registry/foo:1.2.0"));
    assert!(!runtime.has_tag("registry/foo:latest"));
    assert!(!host.base_dir().join("foo").exists());
    assert!(!host.dir("units").join("foo.service").exists());

    let reloaded = host.index();
    assert!(!reloaded.get("foo")?.is_installed());
    Ok(())
}

#[test]
fn conflicting_package_rolls_back_all_side_effects() -> TestResult {
    let host = Host::new();
    host.seed_installed("baz", "2.5.0", "service:\n  name: baz\n");
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "package:\n  breaks:\n    - \"baz <3.0.0\"\nservice:\n  name: foo\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), false)
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Solve(spm_solve::Error::Conflict { .. })
    ));

    assert!(!runtime.has_tag("registry/foo:latest"));
    assert!(!host.base_dir().join("foo").exists());
    Ok(())
}

#[test]
fn force_downgrades_dependency_errors_to_warnings() -> TestResult {
    let host = Host::new();
    host.seed_installed("bar", "1.9.0", "service:\n  name: bar\n");
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "package:\n  depends:\n    - \"bar >=2.0.0\"\nservice:\n  name: foo\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", Some(Version::new(1, 2, 0)), true)?;

    assert!(host.index().get("foo")?.is_installed());
    Ok(())
}

#[test]
fn failed_pull_is_wrapped_with_its_phase() -> TestResult {
    let host = Host::new();
    let mut runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    runtime.fail_pull = true;
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), false)
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Installation {
            phase: "image pull",
            ..
        }
    ));

    // Force does not help against operational errors.
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), true)
        .unwrap_err();
    assert!(matches!(error, Error::Installation { .. }));
    Ok(())
}

#[test]
fn asic_service_targets_asic_partitions_and_gets_multi_instance_unit() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "package:\n  initial-config:\n    TELEMETRY:\n      settings:\n        interval: \"30\"\n\
         service:\n  name: foo\n  asic-service: true\n  host-service: false\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &["asic0", "asic1"]);
    manager.install("foo", Some(Version::new(1, 2, 0)), false)?;

    // Both per-asic partitions received the merge; the host did not.
    for partition in ["asic0", "asic1"] {
        let row = manager
            .config_store(partition)
            .unwrap()
            .get_entry("TELEMETRY", "settings");
        assert_eq!(row.get("interval").unwrap(), "30", "{partition}");
    }
    assert!(
        manager
            .config_store("host")
            .unwrap()
            .get_entry("TELEMETRY", "settings")
            .is_empty()
    );

    // The multi-instance unit exists alongside the single-instance one.
    assert!(host.dir("units").join("foo.service").exists());
    assert!(host.dir("units").join("foo@.service").exists());

    // Scope flags follow the manifest.
    let row = feature_row(&manager, "host", "foo");
    assert_eq!(row.get("has_per_asic_scope").unwrap(), "True");
    assert_eq!(row.get("has_global_scope").unwrap(), "False");
    Ok(())
}

#[test]
fn base_os_incompatibility_fails_without_force() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "package:\n  sonic-version: \">=2.0.0\"\nservice:\n  name: foo\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), false)
        .unwrap_err();
    assert!(matches!(error, Error::BaseOsIncompatible { .. }));
    assert!(!host.base_dir().join("foo").exists());

    // With force the same installation goes through.
    manager.install("foo", Some(Version::new(1, 2, 0)), true)?;
    assert!(host.index().get("foo")?.is_installed());
    Ok(())
}

#[test]
fn install_then_uninstall_restores_the_initial_state() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", Some(Version::new(1, 2, 0)), false)?;
    manager.uninstall("foo", false)?;

    assert!(!host.dir("units").join("foo.service").exists());
    assert!(!host.dir("mgmt").join("foo.sh").exists());
    assert!(!host.dir("ctl").join("foo.sh").exists());
    assert!(!host.dir("monit").join("monit_foo").exists());
    assert!(!host.base_dir().join("foo").exists());
    assert!(!runtime.has_tag("registry/foo:1.2.0"));
    assert!(!runtime.has_tag("registry/foo:latest"));
    assert!(feature_row(&manager, "host", "foo").is_empty());

    let reloaded = host.index();
    let entry = reloaded.get("foo")?;
    assert!(!entry.is_installed());
    assert!(entry.version.is_none());
    Ok(())
}

#[test]
fn uninstall_refuses_when_a_dependent_remains() -> TestResult {
    let host = Host::new();
    host.seed_installed("foo", "1.0.0", "service:\n  name: foo\n");
    host.seed_installed(
        "bar",
        "1.0.0",
        "package:\n  depends:\n    - foo\nservice:\n  name: bar\n",
    );
    let runtime = MockRuntime::default();
    let runner = RecordingRunner::default();

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager.uninstall("foo", false).unwrap_err();
    assert!(matches!(
        error,
        Error::Solve(spm_solve::Error::DependencyMissing { package, .. }) if package == "bar"
    ));

    // foo remains fully installed.
    assert!(host.index().get("foo")?.is_installed());
    assert!(host.base_dir().join("foo/manifest.yml").exists());
    Ok(())
}

#[test]
fn uninstall_of_an_essential_package_is_refused_even_with_force() -> TestResult {
    let host = Host::new();
    host.seed_installed("database", "1.0.0", "service:\n  name: database\n");
    {
        let mut index = host.index();
        let mut entry = index.get("database")?.clone();
        entry.essential = true;
        index.update(entry)?;
    }
    let runtime = MockRuntime::default();
    let runner = RecordingRunner::default();

    let mut manager = host.manager(&runtime, &runner, &[]);
    for force in [false, true] {
        let error = manager.uninstall("database", force).unwrap_err();
        assert!(matches!(error, Error::Essential { .. }));
    }
    assert!(host.index().get("database")?.is_installed());
    Ok(())
}

#[test]
fn uninstall_of_a_not_installed_package_fails_without_force() -> TestResult {
    let host = Host::new();
    host.index().add("foo", "registry/foo", None, None)?;
    let runtime = MockRuntime::default();
    let runner = RecordingRunner::default();

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager.uninstall("foo", false).unwrap_err();
    assert!(matches!(error, Error::NotInstalled { name } if name == "foo"));

    // With force the removal steps run and tolerate the absent state.
    manager.uninstall("foo", true)?;
    Ok(())
}

#[test]
fn reinstall_preserves_operator_enabled_state() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", Some(Version::new(1, 2, 0)), false)?;

    // The operator enables the feature, then the package is reinstalled.
    let mut row = feature_row(&manager, "host", "foo");
    row.insert("state".to_string(), "enabled".to_string());
    manager
        .config_store_mut("host")
        .unwrap()
        .set_entry(FEATURE_TABLE, "foo", row);
    manager.uninstall("foo", true)?;
    manager.install("foo", Some(Version::new(1, 2, 0)), true)?;

    // Deregistration removed the row, so the fresh install starts disabled.
    let row = feature_row(&manager, "host", "foo");
    assert_eq!(row.get("state").unwrap(), "disabled");
    Ok(())
}

#[test]
fn failing_service_integration_rolls_back_metadata_and_images() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata("registry/foo", FOO_MANIFEST);
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    // Break the unit template so service integration fails mid-transaction.
    fs::remove_file(host.dir("templates").join("sonic-service.hbs"))?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    let error = manager
        .install("foo", Some(Version::new(1, 2, 0)), false)
        .unwrap_err();
    assert!(matches!(
        error,
        Error::Installation {
            phase: "service integration",
            ..
        }
    ));

    assert!(!host.base_dir().join("foo").exists());
    assert!(!runtime.has_tag("registry/foo:latest"));
    assert!(feature_row(&manager, "host", "foo").is_empty());
    assert!(!host.index().get("foo")?.is_installed());
    Ok(())
}

#[test]
fn monitored_processes_generate_a_monit_fragment() -> TestResult {
    let host = Host::new();
    let runtime = MockRuntime::with_metadata(
        "registry/foo",
        "service:\n  name: foo\nprocesses:\n  - name: food\n    command: /usr/bin/food\n",
    );
    let runner = RecordingRunner::default();
    host.index().add("foo", "registry/foo", None, None)?;

    let mut manager = host.manager(&runtime, &runner, &[]);
    manager.install("foo", Some(Version::new(1, 2, 0)), false)?;
    assert!(host.dir("monit").join("monit_foo").exists());
    assert!(
        runner
            .commands
            .borrow()
            .contains(&"systemctl reload monit".to_string())
    );

    manager.uninstall("foo", false)?;
    assert!(!host.dir("monit").join("monit_foo").exists());
    Ok(())
}
