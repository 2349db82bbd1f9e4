//! Filesystem helpers shared by the package manager crates.

use std::{
    fs,
    path::Path,
};

use crate::Error;

/// Writes `contents` to `path` atomically.
///
/// The data is written to a temporary file in the same directory and then
/// renamed over the target, so readers never observe a partial file.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created, written or
/// renamed.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), Error> {
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "creating a temporary file for atomic write",
        source,
    })?;
    use std::io::Write;
    file.write_all(contents.as_bytes())
        .map_err(|source| Error::IoPath {
            path: path.to_path_buf(),
            context: "writing a temporary file for atomic write",
            source,
        })?;
    file.persist(path).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "renaming a temporary file over the target",
        source: source.error,
    })?;
    Ok(())
}

/// Marks `path` as executable for user, group and other.
///
/// # Errors
///
/// Returns an error if the file metadata cannot be read or changed.
#[cfg(unix)]
pub fn set_executable(path: &Path) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "reading file metadata",
        source,
    })?;
    let mut permissions = metadata.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions).map_err(|source| Error::IoPath {
        path: path.to_path_buf(),
        context: "marking file executable",
        source,
    })
}

/// Marks `path` as executable; a no-op on platforms without permission
/// bits.
#[cfg(not(unix))]
pub fn set_executable(_path: &Path) -> Result<(), Error> {
    Ok(())
}
