//! The container runtime seam.

use log::info;
use spm_types::Version;

use crate::Error;

/// A running or stopped container as reported by the runtime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerSummary {
    /// The container identifier.
    pub id: String,
    /// The image reference the container was created from.
    pub image: String,
}

/// An image as reported by the runtime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImageSummary {
    /// The image identifier.
    pub id: String,
    /// The `repository:tag` references pointing at the image.
    pub repo_tags: Vec<String>,
}

/// Operations the install orchestrator needs from a container runtime.
///
/// All operations are synchronous and complete before the next
/// orchestration step begins. Implementations surface a single transient
/// error kind ([`Error::Runtime`]); classification is left to the
/// orchestrator.
pub trait ContainerRuntime: std::fmt::Debug {
    /// Pulls `repository:tag` from its registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be downloaded.
    fn pull(&self, repository: &str, tag: &str) -> Result<(), Error>;

    /// Tags the image `image` as `repository:new_tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image does not exist or tagging fails.
    fn tag(&self, image: &str, repository: &str, new_tag: &str) -> Result<(), Error>;

    /// Removes the image reference `image` (a `repository:tag` form).
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be removed.
    fn remove_image(&self, image: &str, force: bool) -> Result<(), Error>;

    /// Lists all containers, running or not.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn list_containers(&self) -> Result<Vec<ContainerSummary>, Error>;

    /// Lists all images.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    fn list_images(&self) -> Result<Vec<ImageSummary>, Error>;

    /// Starts a detached container from `image` with the given entrypoint
    /// and returns its identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be created or started.
    fn run_detached(
        &self,
        image: &str,
        entrypoint: &str,
        arguments: &[&str],
    ) -> Result<String, Error>;

    /// Copies `path` out of the container as a tar stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the path does not exist in the container or the
    /// copy fails.
    fn copy_from(&self, container_id: &str, path: &str) -> Result<Vec<u8>, Error>;

    /// Removes a container.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be removed.
    fn remove_container(&self, container_id: &str, force: bool) -> Result<(), Error>;
}

/// Formats an image reference as `<repository>:<tag>`.
pub fn image_reference(repository: &str, tag: &str) -> String {
    format!("{repository}:{tag}")
}

/// Removes every container and image reference belonging to a package.
///
/// Containers created from `<repository>:<version>` or `<repository>:latest`
/// are force-removed first, then both tags are removed from the image store.
/// References that are already absent are skipped, so the operation is safe
/// to repeat during rollback and uninstall.
///
/// # Errors
///
/// Returns an error if the runtime cannot be queried or a removal fails.
pub fn remove_package_images(
    runtime: &dyn ContainerRuntime,
    repository: &str,
    version: &Version,
) -> Result<(), Error> {
    let versioned = format!("{repository}:{version}");
    let latest = format!("{repository}:latest");

    for container in runtime.list_containers()? {
        if container.image == versioned || container.image == latest {
            runtime.remove_container(&container.id, true)?;
        }
    }

    for image in runtime.list_images()? {
        for repo_tag in &image.repo_tags {
            if *repo_tag == versioned || *repo_tag == latest {
                info!("Removing {repo_tag}");
                runtime.remove_image(repo_tag, true)?;
            }
        }
    }

    Ok(())
}
