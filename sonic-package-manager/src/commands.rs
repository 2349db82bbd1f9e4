//! Implementations of the commandline commands.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};

use spm_common::{HostInfo, SystemRunner, paths};
use spm_container::DockerCli;
use spm_db::{IndexLock, RepositoryIndex};
use spm_registry::{ConfigStore, JsonFileConfigStore};
use spm_service::{MonitIntegrator, ServiceIntegrator};
use spm_types::{Version, parse_version};
use tabled::{Table, Tabled, settings::Style};

use crate::{
    Error,
    PackageManager,
    cli::{Command, PackageCommand, RepositoryCommand, ShowCommand},
};

/// One row of the `list` output.
#[derive(Tabled)]
struct ListRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Runs a parsed command.
///
/// # Errors
///
/// Returns an error if the command fails; the caller renders it as a single
/// red line and exits non-zero.
pub fn run(command: Command) -> Result<(), Error> {
    let base_dir = PathBuf::from(paths::PACKAGE_MANAGER_DIR);
    match command {
        Command::Repository { command } => match command {
            RepositoryCommand::Add {
                name,
                repository,
                description,
                default_version,
            } => repository_add(&base_dir, &name, &repository, description, default_version),
            RepositoryCommand::Remove { name } => repository_remove(&base_dir, &name),
        },
        Command::List => list(&base_dir),
        Command::Package { command } => match command {
            PackageCommand::Show { command } => match command {
                ShowCommand::Manifest { name } => show_manifest(&base_dir, &name),
                ShowCommand::Changelog { name } => show_changelog(&base_dir, &name),
            },
        },
        Command::Install {
            package,
            force,
            yes,
        } => install(&base_dir, &package, force, yes),
        Command::Uninstall { name, force, yes } => uninstall(&base_dir, &name, force, yes),
    }
}

/// Adds a repository to the index.
fn repository_add(
    base_dir: &Path,
    name: &str,
    repository: &str,
    description: Option<String>,
    default_version: Option<String>,
) -> Result<(), Error> {
    require_root()?;
    let default_version = default_version
        .map(|version| parse_version(&version))
        .transpose()?;

    let _lock = IndexLock::exclusive(base_dir)?;
    let mut index = RepositoryIndex::open(base_dir)?;
    index.add(name, repository, description, default_version)?;
    Ok(())
}

/// Removes a repository from the index.
fn repository_remove(base_dir: &Path, name: &str) -> Result<(), Error> {
    require_root()?;
    let _lock = IndexLock::exclusive(base_dir)?;
    let mut index = RepositoryIndex::open(base_dir)?;
    index.remove(name)?;
    Ok(())
}

/// Prints the repository table.
fn list(base_dir: &Path) -> Result<(), Error> {
    let _lock = IndexLock::shared(base_dir)?;
    let index = RepositoryIndex::open(base_dir)?;

    let rows: Vec<ListRow> = index
        .entries()
        .into_iter()
        .map(|entry| ListRow {
            name: entry.name.clone(),
            repository: entry.repository.clone(),
            description: entry.description.clone().unwrap_or_default(),
            version: entry
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "N/A".to_string()),
            status: entry.status_text().to_string(),
        })
        .collect();

    println!("{}", Table::new(rows).with(Style::blank()));
    Ok(())
}

/// Prints the manifest of an installed package as YAML.
fn show_manifest(base_dir: &Path, name: &str) -> Result<(), Error> {
    let _lock = IndexLock::shared(base_dir)?;
    let index = RepositoryIndex::open(base_dir)?;
    let entry = index.get(name)?;
    if !entry.is_installed() {
        return Err(Error::NotInstalled {
            name: name.to_string(),
        });
    }

    let manifest = index.manifest(entry)?;
    let rendered = serde_yaml::to_string(&manifest)?;
    println!("{rendered}");
    Ok(())
}

/// Prints the changelog of a package, versions ascending.
fn show_changelog(base_dir: &Path, name: &str) -> Result<(), Error> {
    let _lock = IndexLock::shared(base_dir)?;
    let index = RepositoryIndex::open(base_dir)?;
    let entry = index.get(name)?;
    let manifest = index.manifest(entry)?;

    if manifest.package.changelog.is_empty() {
        return Err(Error::NoChangelog {
            name: name.to_string(),
        });
    }
    for (version, lines) in &manifest.package.changelog {
        println!("{version}:");
        for line in lines {
            println!("    \u{2022} {line}");
        }
        println!();
    }
    Ok(())
}

/// Installs a package, optionally pinned as `NAME==VERSION`.
fn install(base_dir: &Path, package: &str, force: bool, yes: bool) -> Result<(), Error> {
    require_root()?;
    let (name, version) = parse_package_expression(package)?;
    if !confirm(yes, &format!("Install {name}?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let _lock = IndexLock::exclusive(base_dir)?;
    let runner = SystemRunner;
    let runtime = DockerCli::new()?;
    let host = HostInfo::load(Path::new(paths::SONIC_VERSION_FILE))?;
    let index = RepositoryIndex::open(base_dir)?;
    let service = ServiceIntegrator::new(&runner, &host.platform);
    let monit = MonitIntegrator::new(&runner);
    let host_store: Box<dyn ConfigStore> =
        Box::new(JsonFileConfigStore::open(Path::new(paths::RUNNING_CONFIG_FILE))?);
    let asic_stores = asic_config_stores(Path::new(paths::ETC_SONIC_DIR))?;

    let mut manager =
        PackageManager::new(index, &runtime, service, monit, host_store, asic_stores, host);
    manager.install(&name, version, force)
}

/// Uninstalls a package.
fn uninstall(base_dir: &Path, name: &str, force: bool, yes: bool) -> Result<(), Error> {
    require_root()?;
    if !confirm(yes, &format!("Uninstall {name}?"))? {
        println!("Aborted.");
        return Ok(());
    }

    let _lock = IndexLock::exclusive(base_dir)?;
    let runner = SystemRunner;
    let runtime = DockerCli::new()?;
    let host = HostInfo::load(Path::new(paths::SONIC_VERSION_FILE))?;
    let index = RepositoryIndex::open(base_dir)?;
    let service = ServiceIntegrator::new(&runner, &host.platform);
    let monit = MonitIntegrator::new(&runner);
    let host_store: Box<dyn ConfigStore> =
        Box::new(JsonFileConfigStore::open(Path::new(paths::RUNNING_CONFIG_FILE))?);
    let asic_stores = asic_config_stores(Path::new(paths::ETC_SONIC_DIR))?;

    let mut manager =
        PackageManager::new(index, &runtime, service, monit, host_store, asic_stores, host);
    manager.uninstall(name, force)
}

/// Splits an install expression into name and optional version.
fn parse_package_expression(package: &str) -> Result<(String, Option<Version>), Error> {
    match package.split_once("==") {
        Some((name, version)) => Ok((name.to_string(), Some(parse_version(version)?))),
        None => Ok((package.to_string(), None)),
    }
}

/// Asks the operator for confirmation unless `yes` is set.
fn confirm(yes: bool, prompt: &str) -> Result<bool, Error> {
    if yes {
        return Ok(true);
    }
    print!("{prompt} [y/N] ");
    io::stdout().flush().map_err(|source| spm_common::Error::IoPath {
        path: PathBuf::from("/dev/stdout"),
        context: "flushing the confirmation prompt",
        source,
    })?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .map_err(|source| spm_common::Error::IoPath {
            path: PathBuf::from("/dev/stdin"),
            context: "reading the confirmation answer",
            source,
        })?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

/// Requires the effective user to be root.
fn require_root() -> Result<(), Error> {
    if !nix::unistd::Uid::effective().is_root() {
        return Err(Error::RootRequired);
    }
    Ok(())
}

/// Discovers the per-ASIC configuration store partitions.
///
/// Multi-ASIC platforms persist one running configuration per ASIC as
/// `config_db<N>.json`; each becomes an `asic<N>` partition.
fn asic_config_stores(
    etc_dir: &Path,
) -> Result<BTreeMap<String, Box<dyn ConfigStore>>, Error> {
    let mut stores: BTreeMap<String, Box<dyn ConfigStore>> = BTreeMap::new();
    if !etc_dir.is_dir() {
        return Ok(stores);
    }

    let entries = fs::read_dir(etc_dir).map_err(|source| spm_common::Error::IoPath {
        path: etc_dir.to_path_buf(),
        context: "listing the host configuration directory",
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| spm_common::Error::IoPath {
            path: etc_dir.to_path_buf(),
            context: "listing the host configuration directory",
            source,
        })?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        let Some(asic_id) = file_name
            .strip_prefix("config_db")
            .and_then(|rest| rest.strip_suffix(".json"))
        else {
            continue;
        };
        if asic_id.is_empty() || !asic_id.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        stores.insert(
            format!("asic{asic_id}"),
            Box::new(JsonFileConfigStore::open(&entry.path())?),
        );
    }
    Ok(stores)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn package_expression_with_version() -> TestResult {
        let (name, version) = parse_package_expression("foo==1.2.0")?;
        assert_eq!(name, "foo");
        assert_eq!(version, Some(Version::new(1, 2, 0)));
        Ok(())
    }

    #[test]
    fn package_expression_without_version() -> TestResult {
        let (name, version) = parse_package_expression("foo")?;
        assert_eq!(name, "foo");
        assert_eq!(version, None);
        Ok(())
    }

    #[test]
    fn package_expression_with_bad_version_fails() {
        assert!(parse_package_expression("foo==not.a.version").is_err());
    }

    #[test]
    fn asic_stores_are_discovered_by_file_name() -> TestResult {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("config_db0.json"), "{}")?;
        fs::write(tmp.path().join("config_db1.json"), "{}")?;
        fs::write(tmp.path().join("config_db.json"), "{}")?;
        fs::write(tmp.path().join("sonic_version.yml"), "")?;

        let stores = asic_config_stores(tmp.path())?;
        let partitions: Vec<&str> = stores.keys().map(String::as_str).collect();
        assert_eq!(partitions, ["asic0", "asic1"]);
        Ok(())
    }
}
