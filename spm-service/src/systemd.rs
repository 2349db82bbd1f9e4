//! Generation of systemd units and control scripts.

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::info;
use serde::Serialize;
use spm_common::{CommandRunner, TemplateRenderer, paths};
use spm_db::{RepositoryEntry, RepositoryIndex};
use spm_manifest::Manifest;

use crate::{Error, dependent};

/// The template of single- and multi-instance service units.
const SERVICE_UNIT_TEMPLATE: &str = "sonic-service.hbs";
/// The template of the service management script.
const SERVICE_MGMT_TEMPLATE: &str = "service-mgmt.sh.hbs";
/// The template of the container control script.
const CONTAINER_CTL_TEMPLATE: &str = "docker_image_ctl.hbs";

/// A unit referenced from a generated unit file.
///
/// `is_package` tells the template whether the referenced name is itself a
/// package known to the index, which changes the ordering semantics the
/// template applies.
#[derive(Debug, Serialize)]
struct UnitRef {
    name: String,
    is_package: bool,
}

/// The rendering context of a service unit file.
#[derive(Debug, Serialize)]
struct UnitContext {
    description: String,
    name: String,
    requires: Vec<UnitRef>,
    requisite: Vec<UnitRef>,
    after: Vec<UnitRef>,
    before: Vec<UnitRef>,
    wanted_by: Vec<UnitRef>,
    sonic_asic_platform: String,
    user: String,
    multi_instance: bool,
}

/// The rendering context of the service management script.
#[derive(Debug, Serialize)]
struct MgmtContext {
    dependent_services: Vec<String>,
    multiasic_dependent_services: Vec<String>,
    peer_service_name: String,
    service_name: String,
    sonic_asic_platform: String,
}

/// The rendering context of the container control script.
#[derive(Debug, Serialize)]
struct CtlContext {
    docker_container_name: String,
    docker_image_name: String,
    docker_image_run_opt: String,
    sonic_asic_platform: String,
}

/// Generates and removes the host service integration of a package.
#[derive(Debug)]
pub struct ServiceIntegrator<'a> {
    runner: &'a dyn CommandRunner,
    renderer: TemplateRenderer,
    platform: String,
    templates_dir: PathBuf,
    unit_dir: PathBuf,
    mgmt_script_dir: PathBuf,
    ctl_script_dir: PathBuf,
    etc_sonic_dir: PathBuf,
}

impl<'a> ServiceIntegrator<'a> {
    /// Creates an integrator using the well-known host locations.
    pub fn new(runner: &'a dyn CommandRunner, platform: &str) -> Self {
        ServiceIntegrator {
            runner,
            renderer: TemplateRenderer::new(),
            platform: platform.to_string(),
            templates_dir: PathBuf::from(paths::TEMPLATES_DIR),
            unit_dir: PathBuf::from(paths::SYSTEMD_UNIT_DIR),
            mgmt_script_dir: PathBuf::from(paths::SERVICE_MGMT_SCRIPT_DIR),
            ctl_script_dir: PathBuf::from(paths::CONTAINER_CTL_SCRIPT_DIR),
            etc_sonic_dir: PathBuf::from(paths::ETC_SONIC_DIR),
        }
    }

    /// Overrides the template directory.
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    /// Overrides the systemd unit directory.
    pub fn unit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.unit_dir = dir.into();
        self
    }

    /// Overrides the service management script directory.
    pub fn mgmt_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mgmt_script_dir = dir.into();
        self
    }

    /// Overrides the container control script directory.
    pub fn ctl_script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ctl_script_dir = dir.into();
        self
    }

    /// Overrides the reverse-dependency file directory.
    pub fn etc_sonic_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.etc_sonic_dir = dir.into();
        self
    }

    /// The path of the single-instance unit of `feature`.
    pub fn unit_path(&self, feature: &str) -> PathBuf {
        self.unit_dir.join(format!("{feature}.service"))
    }

    /// The path of the multi-instance unit of `feature`.
    pub fn multi_instance_unit_path(&self, feature: &str) -> PathBuf {
        self.unit_dir.join(format!("{feature}@.service"))
    }

    /// The path of the service management script of `feature`.
    pub fn mgmt_script_path(&self, feature: &str) -> PathBuf {
        self.mgmt_script_dir.join(format!("{feature}.sh"))
    }

    /// The path of the container control script of `feature`.
    pub fn ctl_script_path(&self, feature: &str) -> PathBuf {
        self.ctl_script_dir.join(format!("{feature}.sh"))
    }

    /// Generates all service artifacts of a package and reloads the
    /// supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if a template cannot be rendered, a file cannot be
    /// written, the manifest names an unsupported base service, or the
    /// supervisor reload fails.
    pub fn install(
        &self,
        index: &RepositoryIndex,
        entry: &RepositoryEntry,
        manifest: &Manifest,
    ) -> Result<(), Error> {
        self.generate_units(index, entry, manifest)?;
        self.generate_mgmt_script(index, manifest)?;
        self.generate_ctl_script(entry, manifest)?;
        dependent::update(&self.etc_sonic_dir, manifest, true)?;
        self.reload_supervisor()
    }

    /// Removes all service artifacts of a package and reloads the
    /// supervisor.
    ///
    /// Already absent files are skipped, so the operation is idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be removed or the supervisor
    /// reload fails.
    pub fn uninstall(&self, manifest: &Manifest) -> Result<(), Error> {
        let feature = &manifest.service.name;
        for path in [
            self.unit_path(feature),
            self.multi_instance_unit_path(feature),
            self.mgmt_script_path(feature),
            self.ctl_script_path(feature),
        ] {
            remove_if_present(&path)?;
        }
        dependent::update(&self.etc_sonic_dir, manifest, false)?;
        self.reload_supervisor()
    }

    /// Reloads the service supervisor.
    ///
    /// # Errors
    ///
    /// Returns an error if the reload command fails.
    pub fn reload_supervisor(&self) -> Result<(), Error> {
        self.runner.run("systemctl", &["daemon-reload"])?;
        Ok(())
    }

    fn generate_units(
        &self,
        index: &RepositoryIndex,
        entry: &RepositoryEntry,
        manifest: &Manifest,
    ) -> Result<(), Error> {
        let feature = &manifest.service.name;
        let template = self.templates_dir.join(SERVICE_UNIT_TEMPLATE);
        let mut context = UnitContext {
            description: entry
                .description
                .clone()
                .unwrap_or_else(|| format!("{feature} container")),
            name: feature.clone(),
            requires: unit_refs(index, &manifest.service.requires),
            requisite: unit_refs(index, &manifest.service.requisite),
            after: unit_refs(index, &manifest.service.after),
            before: unit_refs(index, &manifest.service.before),
            wanted_by: unit_refs(index, &manifest.service.wanted_by),
            sonic_asic_platform: self.platform.clone(),
            user: manifest.service.user.clone(),
            multi_instance: false,
        };

        let unit = self.unit_path(feature);
        self.renderer.render_to_file(&template, &unit, &context)?;
        info!("Installed {}", unit.display());

        if manifest.service.asic_service {
            context.multi_instance = true;
            let unit = self.multi_instance_unit_path(feature);
            self.renderer.render_to_file(&template, &unit, &context)?;
            info!("Installed {}", unit.display());
        }
        Ok(())
    }

    fn generate_mgmt_script(
        &self,
        index: &RepositoryIndex,
        manifest: &Manifest,
    ) -> Result<(), Error> {
        let feature = &manifest.service.name;
        let mut dependent_services = Vec::new();
        let mut multiasic_dependent_services = Vec::new();

        // Collect installed packages declaring this feature in dependent-of,
        // split by whether they run per ASIC.
        for other in index.entries() {
            if other.name == *feature || !other.is_installed() {
                continue;
            }
            let other_manifest = index.manifest(other)?;
            if !other_manifest
                .service
                .dependent_of
                .iter()
                .any(|service| service == feature)
            {
                continue;
            }
            if other_manifest.service.asic_service {
                multiasic_dependent_services.push(other.name.clone());
            } else {
                dependent_services.push(other.name.clone());
            }
        }

        let context = MgmtContext {
            dependent_services,
            multiasic_dependent_services,
            peer_service_name: manifest.service.peer.clone().unwrap_or_default(),
            service_name: feature.clone(),
            sonic_asic_platform: self.platform.clone(),
        };

        let script = self.mgmt_script_path(feature);
        self.renderer.render_to_file(
            &self.templates_dir.join(SERVICE_MGMT_TEMPLATE),
            &script,
            &context,
        )?;
        spm_common::fs::set_executable(&script)?;
        info!("Installed {}", script.display());
        Ok(())
    }

    fn generate_ctl_script(
        &self,
        entry: &RepositoryEntry,
        manifest: &Manifest,
    ) -> Result<(), Error> {
        let feature = &manifest.service.name;
        let context = CtlContext {
            docker_container_name: feature.clone(),
            docker_image_name: entry.repository.clone(),
            docker_image_run_opt: container_run_options(manifest),
            sonic_asic_platform: self.platform.clone(),
        };

        let script = self.ctl_script_path(feature);
        self.renderer.render_to_file(
            &self.templates_dir.join(CONTAINER_CTL_TEMPLATE),
            &script,
            &context,
        )?;
        spm_common::fs::set_executable(&script)?;
        info!("Installed {}", script.display());
        Ok(())
    }
}

/// Annotates unit names with whether they refer to a known package.
fn unit_refs(index: &RepositoryIndex, names: &[String]) -> Vec<UnitRef> {
    names
        .iter()
        .map(|name| UnitRef {
            name: name.clone(),
            is_package: index.has(name),
        })
        .collect()
}

/// Builds the container run options from the manifest's container section.
///
/// Options follow declaration order: `--privileged`, the terminal flag,
/// volumes, mounts, environment variables.
fn container_run_options(manifest: &Manifest) -> String {
    let container = &manifest.container;
    let mut options = Vec::new();

    if container.privileged {
        options.push("--privileged".to_string());
    }
    options.push("-t".to_string());
    for volume in &container.volumes {
        options.push(format!("-v {volume}"));
    }
    for mount in &container.mounts {
        options.push(format!(
            "--mount type={},source={},target={}",
            mount.kind, mount.source, mount.target
        ));
    }
    for (key, value) in &container.environment {
        options.push(format!("-e {key}={value}"));
    }

    options.join(" ")
}

/// Removes `path` if it exists.
fn remove_if_present(path: &Path) -> Result<(), Error> {
    if !path.exists() {
        return Ok(());
    }
    info!("Removing {}", path.display());
    fs::remove_file(path).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "removing a generated service file",
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, collections::BTreeMap};

    use spm_manifest::Mount;
    use testresult::TestResult;

    use super::*;

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

    struct Fixture {
        _tmp: tempfile::TempDir,
        index: RepositoryIndex,
        entry: RepositoryEntry,
        root: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().to_path_buf();

        let templates = root.join("templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(
            templates.join(SERVICE_UNIT_TEMPLATE),
            "Description={{description}}\nUser={{user}}\nMulti={{multi_instance}}\n\
             {{#each requires}}Requires={{name}} pkg={{is_package}}\n{{/each}}",
        )
        .unwrap();
        fs::write(
            templates.join(SERVICE_MGMT_TEMPLATE),
            "SERVICE={{service_name}} PEER={{peer_service_name}} \
             DEPS={{#each dependent_services}}{{this}} {{/each}}\
             MULTI={{#each multiasic_dependent_services}}{{this}} {{/each}}",
        )
        .unwrap();
        fs::write(
            templates.join(CONTAINER_CTL_TEMPLATE),
            "NAME={{docker_container_name}} IMAGE={{docker_image_name}} OPT={{docker_image_run_opt}}",
        )
        .unwrap();

        for dir in ["units", "mgmt", "ctl", "etc", "index"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }

        let mut index = RepositoryIndex::open(&root.join("index")).unwrap();
        index.add("featured", "registry/featured", None, None).unwrap();
        let entry = index.get("featured").unwrap().clone();

        Fixture {
            _tmp: tmp,
            index,
            entry,
            root,
        }
    }

    fn integrator<'a>(runner: &'a RecordingRunner, root: &Path) -> ServiceIntegrator<'a> {
        ServiceIntegrator::new(runner, "mellanox")
            .templates_dir(root.join("templates"))
            .unit_dir(root.join("units"))
            .mgmt_script_dir(root.join("mgmt"))
            .ctl_script_dir(root.join("ctl"))
            .etc_sonic_dir(root.join("etc"))
    }

    fn manifest() -> Manifest {
        let mut manifest = Manifest::default_for("featured");
        manifest.service.requires = vec!["database".to_string(), "updategraph.service".to_string()];
        manifest
    }

    #[test]
    fn install_generates_unit_and_scripts() -> TestResult {
        let fixture = fixture();
        let runner = RecordingRunner::default();
        let integrator = integrator(&runner, &fixture.root);

        integrator.install(&fixture.index, &fixture.entry, &manifest())?;

        let unit = fs::read_to_string(fixture.root.join("units/featured.service"))?;
        assert!(unit.contains("Description=featured container"));
        assert!(unit.contains("User=root"));
        assert!(unit.contains("Multi=false"));
        // "database" is not in the index, so it is not a package reference.
        assert!(unit.contains("Requires=database pkg=false"));
        assert!(!fixture.root.join("units/featured@.service").exists());

        let mgmt = fs::read_to_string(fixture.root.join("mgmt/featured.sh"))?;
        assert!(mgmt.contains("SERVICE=featured"));
        let ctl = fs::read_to_string(fixture.root.join("ctl/featured.sh"))?;
        assert!(ctl.contains("IMAGE=registry/featured"));

        assert_eq!(*runner.commands.borrow(), ["systemctl daemon-reload"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn generated_scripts_are_executable() -> TestResult {
        use std::os::unix::fs::PermissionsExt;

        let fixture = fixture();
        let runner = RecordingRunner::default();
        integrator(&runner, &fixture.root).install(&fixture.index, &fixture.entry, &manifest())?;

        for script in ["mgmt/featured.sh", "ctl/featured.sh"] {
            let mode = fs::metadata(fixture.root.join(script))?.permissions().mode();
            assert_eq!(mode & 0o111, 0o111, "{script} is not executable");
        }
        Ok(())
    }

    #[test]
    fn asic_service_also_gets_multi_instance_unit() -> TestResult {
        let fixture = fixture();
        let runner = RecordingRunner::default();
        let mut manifest = manifest();
        manifest.service.asic_service = true;

        integrator(&runner, &fixture.root).install(&fixture.index, &fixture.entry, &manifest)?;

        let unit = fs::read_to_string(fixture.root.join("units/featured@.service"))?;
        assert!(unit.contains("Multi=true"));
        Ok(())
    }

    #[test]
    fn unit_refs_mark_known_packages() -> TestResult {
        let mut fixture = fixture();
        fixture
            .index
            .add("database", "registry/database", None, None)?;
        let runner = RecordingRunner::default();

        integrator(&runner, &fixture.root).install(&fixture.index, &fixture.entry, &manifest())?;

        let unit = fs::read_to_string(fixture.root.join("units/featured.service"))?;
        assert!(unit.contains("Requires=database pkg=true"));
        assert!(unit.contains("Requires=updategraph.service pkg=false"));
        Ok(())
    }

    #[test]
    fn container_options_follow_declaration_order() {
        let mut manifest = Manifest::default_for("featured");
        manifest.container.privileged = true;
        manifest.container.volumes = vec!["/etc/sonic:/etc/sonic:ro".to_string()];
        manifest.container.mounts = vec![Mount {
            kind: "bind".to_string(),
            source: "/var/log".to_string(),
            target: "/var/log".to_string(),
        }];
        manifest.container.environment =
            BTreeMap::from([("DEBUG".to_string(), "1".to_string())]);

        assert_eq!(
            container_run_options(&manifest),
            "--privileged -t -v /etc/sonic:/etc/sonic:ro \
             --mount type=bind,source=/var/log,target=/var/log -e DEBUG=1"
        );
    }

    #[test]
    fn mgmt_script_collects_dependent_services() -> TestResult {
        let mut fixture = fixture();
        let runner = RecordingRunner::default();

        // An installed package declaring dependent-of: [featured].
        fixture.index.add("watcher", "registry/watcher", None, None)?;
        let metadata = fixture.index.package_metadata_dir("watcher");
        fs::create_dir_all(&metadata)?;
        fs::write(
            metadata.join("manifest.yml"),
            "service:\n  name: watcher\n  dependent-of:\n    - featured\n",
        )?;
        let mut watcher = fixture.index.get("watcher")?.clone();
        watcher.set_installed("1.0.0".parse()?);
        fixture.index.update(watcher)?;

        integrator(&runner, &fixture.root).install(&fixture.index, &fixture.entry, &manifest())?;

        let mgmt = fs::read_to_string(fixture.root.join("mgmt/featured.sh"))?;
        assert!(mgmt.contains("DEPS=watcher "));
        Ok(())
    }

    #[test]
    fn uninstall_removes_artifacts_and_reloads() -> TestResult {
        let fixture = fixture();
        let runner = RecordingRunner::default();
        let integrator = integrator(&runner, &fixture.root);
        let manifest = manifest();

        integrator.install(&fixture.index, &fixture.entry, &manifest)?;
        integrator.uninstall(&manifest)?;

        assert!(!fixture.root.join("units/featured.service").exists());
        assert!(!fixture.root.join("mgmt/featured.sh").exists());
        assert!(!fixture.root.join("ctl/featured.sh").exists());
        assert_eq!(
            *runner.commands.borrow(),
            ["systemctl daemon-reload", "systemctl daemon-reload"]
        );

        // Uninstalling again is idempotent.
        integrator.uninstall(&manifest)?;
        Ok(())
    }
}
