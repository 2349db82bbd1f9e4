//! The configuration store seam.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use crate::Error;

/// The separator between table and key in the persisted flat document.
const TABLE_KEY_SEPARATOR: char = '|';

/// The fields of one configuration row.
///
/// Values are strings; booleans use the platform's `True`/`False`
/// convention.
pub type FieldMap = BTreeMap<String, String>;

/// A handle to one configuration store partition.
///
/// Writes are tentative until [`ConfigStore::save`] persists the running
/// configuration to disk.
pub trait ConfigStore: std::fmt::Debug {
    /// Returns the row at `table`/`key`; an absent row is an empty map.
    fn get_entry(&self, table: &str, key: &str) -> FieldMap;

    /// Replaces the row at `table`/`key`.
    fn set_entry(&mut self, table: &str, key: &str, fields: FieldMap);

    /// Deletes the row at `table`/`key`; deleting an absent row is a no-op.
    fn remove_entry(&mut self, table: &str, key: &str);

    /// Persists the running configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be written.
    fn save(&self) -> Result<(), Error>;
}

/// A [`ConfigStore`] persisted as a flat JSON document.
///
/// Rows are keyed `TABLE|key`, matching the platform's persisted running
/// configuration format.
#[derive(Clone, Debug)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    rows: BTreeMap<String, FieldMap>,
}

impl JsonFileConfigStore {
    /// Opens the store at `path`, loading it eagerly.
    ///
    /// A missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            return Ok(JsonFileConfigStore {
                path: path.to_path_buf(),
                rows: BTreeMap::new(),
            });
        }
        let contents = fs::read_to_string(path).map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "reading the configuration file",
            source,
        })?;
        let rows = serde_json::from_str(&contents).map_err(|source| Error::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(JsonFileConfigStore {
            path: path.to_path_buf(),
            rows,
        })
    }

    fn row_key(table: &str, key: &str) -> String {
        format!("{table}{TABLE_KEY_SEPARATOR}{key}")
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn get_entry(&self, table: &str, key: &str) -> FieldMap {
        self.rows
            .get(&JsonFileConfigStore::row_key(table, key))
            .cloned()
            .unwrap_or_default()
    }

    fn set_entry(&mut self, table: &str, key: &str, fields: FieldMap) {
        self.rows
            .insert(JsonFileConfigStore::row_key(table, key), fields);
    }

    fn remove_entry(&mut self, table: &str, key: &str) {
        self.rows.remove(&JsonFileConfigStore::row_key(table, key));
    }

    fn save(&self) -> Result<(), Error> {
        let rendered = serde_json::to_string_pretty(&self.rows).map_err(|source| Error::Json {
            path: self.path.clone(),
            source,
        })?;
        spm_common::fs::write_atomic(&self.path, &rendered)?;
        Ok(())
    }
}

/// An in-memory [`ConfigStore`] without persistence.
///
/// Useful on systems without a persisted running configuration and as a
/// test double.
#[derive(Clone, Debug, Default)]
pub struct MemoryConfigStore {
    rows: BTreeMap<String, BTreeMap<String, FieldMap>>,
}

impl MemoryConfigStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        MemoryConfigStore::default()
    }

    /// Returns all rows of `table`.
    pub fn table(&self, table: &str) -> BTreeMap<String, FieldMap> {
        self.rows.get(table).cloned().unwrap_or_default()
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get_entry(&self, table: &str, key: &str) -> FieldMap {
        self.rows
            .get(table)
            .and_then(|rows| rows.get(key))
            .cloned()
            .unwrap_or_default()
    }

    fn set_entry(&mut self, table: &str, key: &str, fields: FieldMap) {
        self.rows
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), fields);
    }

    fn remove_entry(&mut self, table: &str, key: &str) {
        if let Some(rows) = self.rows.get_mut(table) {
            rows.remove(key);
            if rows.is_empty() {
                self.rows.remove(table);
            }
        }
    }

    fn save(&self) -> Result<(), Error> {
        Ok(())
    }
}
