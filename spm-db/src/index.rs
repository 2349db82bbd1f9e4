//! The repository index.

use std::{
    cmp::Ordering,
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use log::debug;
use spm_manifest::Manifest;
use spm_types::Version;

use crate::{Error, InstallStatus, RepositoryEntry};

/// The index file name inside the package manager directory.
const INDEX_FILE_NAME: &str = "packages.yml";

/// The persistent collection of repository entries.
///
/// Stored as a single YAML document mapping repository names to entry
/// fields. Every mutating operation writes the document back atomically.
#[derive(Clone, Debug)]
pub struct RepositoryIndex {
    base_dir: PathBuf,
    entries: BTreeMap<String, RepositoryEntry>,
}

impl RepositoryIndex {
    /// Opens the index inside `base_dir`, loading it eagerly.
    ///
    /// A missing index file yields an empty index; an unparseable file or an
    /// entry violating the `status ⇔ version` invariant is a corrupt index.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn open(base_dir: &Path) -> Result<Self, Error> {
        let path = base_dir.join(INDEX_FILE_NAME);
        if !path.exists() {
            debug!("No index at {}, starting empty", path.display());
            return Ok(RepositoryIndex {
                base_dir: base_dir.to_path_buf(),
                entries: BTreeMap::new(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| Error::IoPath {
            path: path.clone(),
            context: "reading the repository index",
            source,
        })?;
        let mut entries: BTreeMap<String, RepositoryEntry> = serde_yaml::from_str(&contents)
            .map_err(|error| Error::Corrupt {
                path: path.clone(),
                reason: error.to_string(),
            })?;

        for (name, entry) in entries.iter_mut() {
            entry.name = name.clone();
            match (entry.status, entry.version.as_ref()) {
                (InstallStatus::Installed, None) => {
                    return Err(Error::Corrupt {
                        path,
                        reason: format!("entry '{name}' is installed but has no version"),
                    });
                }
                (InstallStatus::NotInstalled, Some(_)) => {
                    return Err(Error::Corrupt {
                        path,
                        reason: format!("entry '{name}' is not installed but has a version"),
                    });
                }
                _ => {}
            }
        }

        Ok(RepositoryIndex {
            base_dir: base_dir.to_path_buf(),
            entries,
        })
    }

    /// The directory the index and the package metadata folders live in.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(INDEX_FILE_NAME)
    }

    /// The host metadata folder of the package `name`.
    pub fn package_metadata_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Writes the index back to disk atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the atomic write fails.
    pub fn save(&self) -> Result<(), Error> {
        let rendered = serde_yaml::to_string(&self.entries)?;
        spm_common::fs::write_atomic(&self.index_path(), &rendered)?;
        Ok(())
    }

    /// Adds a new repository and persists the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyExists`] if an entry with `name` is present,
    /// or an error if persisting fails.
    pub fn add(
        &mut self,
        name: &str,
        repository: &str,
        description: Option<String>,
        default_version: Option<Version>,
    ) -> Result<(), Error> {
        if self.entries.contains_key(name) {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }
        let mut entry = RepositoryEntry::new(name, repository);
        entry.description = description;
        entry.default_version = default_version;
        self.entries.insert(name.to_string(), entry);
        self.save()
    }

    /// Removes a repository and persists the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry with `name` exists,
    /// [`Error::Essential`] for essential entries,
    /// [`Error::StillInstalled`] while the package is installed, or an error
    /// if persisting fails.
    pub fn remove(&mut self, name: &str) -> Result<(), Error> {
        let entry = self.get(name)?;
        if entry.essential {
            return Err(Error::Essential {
                name: name.to_string(),
            });
        }
        if entry.is_installed() {
            return Err(Error::StillInstalled {
                name: name.to_string(),
            });
        }
        self.entries.remove(name);
        self.save()
    }

    /// Replaces an existing entry and persists the index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry with the entry's name exists,
    /// or an error if persisting fails.
    pub fn update(&mut self, entry: RepositoryEntry) -> Result<(), Error> {
        if !self.entries.contains_key(&entry.name) {
            return Err(Error::NotFound {
                name: entry.name.clone(),
            });
        }
        self.entries.insert(entry.name.clone(), entry);
        self.save()
    }

    /// Retrieves the entry named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry with `name` exists.
    pub fn get(&self, name: &str) -> Result<&RepositoryEntry, Error> {
        self.entries.get(name).ok_or_else(|| Error::NotFound {
            name: name.to_string(),
        })
    }

    /// Returns whether an entry named `name` exists.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns all entries in natural name order (`asic10` after `asic9`).
    pub fn entries(&self) -> Vec<&RepositoryEntry> {
        let mut entries: Vec<&RepositoryEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| natural_cmp(&a.name, &b.name));
        entries
    }

    /// Loads the manifest of `entry` from its host metadata folder.
    ///
    /// For installed entries a missing metadata folder means the index and
    /// the filesystem disagree, which is treated as corruption.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] for an installed entry without a metadata
    /// folder, or a manifest error if an existing manifest cannot be parsed.
    pub fn manifest(&self, entry: &RepositoryEntry) -> Result<Manifest, Error> {
        let dir = self.package_metadata_dir(&entry.name);
        if entry.is_installed() && !dir.is_dir() {
            return Err(Error::Corrupt {
                path: dir,
                reason: format!(
                    "installed entry '{}' has no metadata folder",
                    entry.name
                ),
            });
        }
        Ok(Manifest::from_metadata_dir(&dir, &entry.name)?)
    }

    /// Returns whether any installed package provides the feature
    /// `feature_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if a manifest of an installed entry cannot be
    /// loaded.
    pub fn is_package_installed(&self, feature_name: &str) -> Result<bool, Error> {
        for entry in self.entries.values() {
            if !entry.is_installed() {
                continue;
            }
            if self.manifest(entry)?.service.name == feature_name {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Compares two names naturally: runs of digits compare numerically, so
/// `asic10` orders after `asic9`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();

    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let mut num_a = String::new();
                while let Some(c) = a.peek().copied().filter(char::is_ascii_digit) {
                    num_a.push(c);
                    a.next();
                }
                let mut num_b = String::new();
                while let Some(c) = b.peek().copied().filter(char::is_ascii_digit) {
                    num_b.push(c);
                    b.next();
                }
                let stripped_a = num_a.trim_start_matches('0');
                let stripped_b = num_b.trim_start_matches('0');
                let ordering = stripped_a
                    .len()
                    .cmp(&stripped_b.len())
                    .then_with(|| stripped_a.cmp(stripped_b))
                    .then_with(|| num_a.len().cmp(&num_b.len()));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}
