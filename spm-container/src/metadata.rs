//! Package metadata extraction.
//!
//! A package image carries its manifest and template fragments in the
//! well-known directory `/var/lib/sonic-package`. Installation copies that
//! directory onto the host by running a short-lived container from the
//! image and streaming the directory out as a tar archive.

use std::{
    fs,
    io::Cursor,
    path::{Component, Path, PathBuf},
};

use log::{info, warn};
use spm_common::paths;
use tar::Archive;

use crate::{ContainerRuntime, Error, image_reference};

/// The entrypoint keeping the helper container alive during the copy.
const KEEPALIVE_ENTRYPOINT: &str = "/bin/sh";
const KEEPALIVE_ARGUMENTS: [&str; 2] = ["-c", "sleep infinity"];

/// Copies the package metadata directory out of `repository:latest` into
/// `metadata_dir` on the host.
///
/// Any pre-existing host metadata folder is removed first. On failure the
/// folder is removed again, so a failed extraction leaves no trace.
///
/// # Errors
///
/// Returns an error if the helper container cannot be driven, the image
/// carries no metadata directory, or unpacking fails.
pub fn install_metadata(
    runtime: &dyn ContainerRuntime,
    repository: &str,
    metadata_dir: &Path,
) -> Result<(), Error> {
    info!("Copying package metadata...");

    uninstall_metadata(metadata_dir)?;
    fs::create_dir_all(metadata_dir).map_err(|source| Error::IoPath {
        path: metadata_dir.to_path_buf(),
        context: "creating the package metadata folder",
        source,
    })?;

    let result = fetch_and_unpack(runtime, repository, metadata_dir);
    if result.is_err() {
        let _ = fs::remove_dir_all(metadata_dir);
    }
    result
}

/// Removes the host metadata folder of a package.
///
/// A missing folder is not an error, so the operation is idempotent.
///
/// # Errors
///
/// Returns an error if an existing folder cannot be removed.
pub fn uninstall_metadata(metadata_dir: &Path) -> Result<(), Error> {
    if !metadata_dir.exists() {
        return Ok(());
    }
    fs::remove_dir_all(metadata_dir).map_err(|source| Error::IoPath {
        path: metadata_dir.to_path_buf(),
        context: "removing the package metadata folder",
        source,
    })
}

/// Streams the metadata directory out of a helper container and unpacks it.
fn fetch_and_unpack(
    runtime: &dyn ContainerRuntime,
    repository: &str,
    metadata_dir: &Path,
) -> Result<(), Error> {
    let image = image_reference(repository, "latest");
    let container = runtime.run_detached(&image, KEEPALIVE_ENTRYPOINT, &KEEPALIVE_ARGUMENTS)?;

    let copied = runtime.copy_from(&container, paths::IMAGE_METADATA_DIR);
    if let Err(error) = runtime.remove_container(&container, true) {
        warn!("Failed to remove helper container {container}: {error}");
    }
    let archive = copied.map_err(|error| match error {
        Error::Runtime { details, .. } => Error::Runtime {
            context: format!(
                "copying package metadata, is {image} a SONiC package image?"
            ),
            details,
        },
        other => other,
    })?;

    unpack_metadata(&archive, metadata_dir)
}

/// Unpacks the metadata tar stream into `metadata_dir`, stripping the
/// archived top-level directory so only its contents land on the host.
fn unpack_metadata(archive: &[u8], metadata_dir: &Path) -> Result<(), Error> {
    let mut archive = Archive::new(Cursor::new(archive));
    let entries = archive.entries().map_err(|source| Error::Archive {
        context: "reading the metadata archive",
        source,
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|source| Error::Archive {
            context: "reading a metadata archive entry",
            source,
        })?;
        let path = entry
            .path()
            .map_err(|source| Error::Archive {
                context: "decoding a metadata archive path",
                source,
            })?
            .into_owned();

        // The archive contains the metadata folder itself; drop the leading
        // component and skip the bare folder entry.
        let mut components = path.components();
        components.next();
        let relative: PathBuf = components.as_path().to_path_buf();
        if relative.as_os_str().is_empty() {
            continue;
        }
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(Error::UnsafeArchivePath { path });
        }

        info!("Copying package metadata: {}", relative.display());
        let target = metadata_dir.join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::IoPath {
                path: parent.to_path_buf(),
                context: "creating a metadata subdirectory",
                source,
            })?;
        }
        entry.unpack(&target).map_err(|source| Error::Archive {
            context: "unpacking a metadata archive entry",
            source,
        })?;
    }

    Ok(())
}
