//! The `docker` CLI implementation of [`ContainerRuntime`].

use std::{
    collections::BTreeMap,
    path::PathBuf,
    process::{Command, Stdio},
};

use log::debug;
use which::which;

use crate::{ContainerRuntime, ContainerSummary, Error, ImageSummary, runtime};

/// The default container runtime binary name.
const DOCKER_BINARY: &str = "docker";

/// A [`ContainerRuntime`] backed by the `docker` command line client.
#[derive(Clone, Debug)]
pub struct DockerCli {
    binary: PathBuf,
}

impl DockerCli {
    /// Creates a driver using the `docker` binary from `PATH`.
    ///
    /// # Errors
    ///
    /// Returns an error if no `docker` binary can be located.
    pub fn new() -> Result<Self, Error> {
        let binary = which(DOCKER_BINARY).map_err(|source| Error::RuntimeNotFound {
            binary: DOCKER_BINARY.to_string(),
            source,
        })?;
        Ok(DockerCli { binary })
    }

    /// Creates a driver using an explicit runtime binary.
    pub fn with_binary(binary: PathBuf) -> Self {
        DockerCli { binary }
    }

    /// Runs the runtime binary with `args` and returns its stdout.
    fn output(&self, args: &[&str], context: &str) -> Result<Vec<u8>, Error> {
        let command_line = format!("{} {}", self.binary.display(), args.join(" "));
        debug!("Running command '{command_line}'");

        let output = Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Runtime {
                context: context.to_string(),
                details: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(output.stdout)
    }

    /// Runs the runtime binary and parses its stdout as UTF-8 lines.
    fn output_lines(&self, args: &[&str], context: &str) -> Result<Vec<String>, Error> {
        let stdout = self.output(args, context)?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }
}

impl ContainerRuntime for DockerCli {
    fn pull(&self, repository: &str, tag: &str) -> Result<(), Error> {
        let image = runtime::image_reference(repository, tag);
        self.output(&["pull", &image], &format!("pulling {image}"))?;
        Ok(())
    }

    fn tag(&self, image: &str, repository: &str, new_tag: &str) -> Result<(), Error> {
        let target = runtime::image_reference(repository, new_tag);
        self.output(&["tag", image, &target], &format!("tagging {image} as {target}"))?;
        Ok(())
    }

    fn remove_image(&self, image: &str, force: bool) -> Result<(), Error> {
        let mut args = vec!["rmi"];
        if force {
            args.push("-f");
        }
        args.push(image);
        self.output(&args, &format!("removing image {image}"))?;
        Ok(())
    }

    fn list_containers(&self) -> Result<Vec<ContainerSummary>, Error> {
        let lines = self.output_lines(
            &["ps", "-a", "--no-trunc", "--format", "{{.ID}} {{.Image}}"],
            "listing containers",
        )?;
        Ok(lines
            .iter()
            .filter_map(|line| line.split_once(' '))
            .map(|(id, image)| ContainerSummary {
                id: id.to_string(),
                image: image.to_string(),
            })
            .collect())
    }

    fn list_images(&self) -> Result<Vec<ImageSummary>, Error> {
        let lines = self.output_lines(
            &[
                "images",
                "-a",
                "--no-trunc",
                "--format",
                "{{.ID}} {{.Repository}}:{{.Tag}}",
            ],
            "listing images",
        )?;

        // The runtime prints one line per repository:tag reference; group
        // them back into one summary per image identifier.
        let mut by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for line in &lines {
            let Some((id, repo_tag)) = line.split_once(' ') else {
                continue;
            };
            let tags = by_id.entry(id.to_string()).or_default();
            if repo_tag != "<none>:<none>" {
                tags.push(repo_tag.to_string());
            }
        }
        Ok(by_id
            .into_iter()
            .map(|(id, repo_tags)| ImageSummary { id, repo_tags })
            .collect())
    }

    fn run_detached(
        &self,
        image: &str,
        entrypoint: &str,
        arguments: &[&str],
    ) -> Result<String, Error> {
        let mut args = vec!["run", "-d", "--entrypoint", entrypoint, image];
        args.extend_from_slice(arguments);
        let stdout = self.output(&args, &format!("starting a container from {image}"))?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    fn copy_from(&self, container_id: &str, path: &str) -> Result<Vec<u8>, Error> {
        let source = format!("{container_id}:{path}");
        self.output(
            &["cp", &source, "-"],
            &format!("copying {path} out of container {container_id}"),
        )
    }

    fn remove_container(&self, container_id: &str, force: bool) -> Result<(), Error> {
        let mut args = vec!["rm"];
        if force {
            args.push("-f");
        }
        args.push(container_id);
        self.output(&args, &format!("removing container {container_id}"))?;
        Ok(())
    }
}
