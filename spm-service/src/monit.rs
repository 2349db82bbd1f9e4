//! Process monitor integration.
//!
//! Packages declaring monitored processes get a fragment under the monit
//! configuration directory; the monitor daemon is reloaded whenever a
//! fragment is added or removed.

use std::{
    fs,
    path::PathBuf,
};

use log::info;
use serde::Serialize;
use spm_common::{CommandRunner, TemplateRenderer, paths};
use spm_manifest::{Manifest, Process};

use crate::Error;

/// The template of monitor fragments.
const MONIT_CONF_TEMPLATE: &str = "monit.conf.hbs";

/// The rendering context of a monitor fragment.
#[derive(Debug, Serialize)]
struct MonitContext<'a> {
    feature: &'a str,
    processes: &'a [Process],
}

/// Generates and removes monitor fragments for a package.
#[derive(Debug)]
pub struct MonitIntegrator<'a> {
    runner: &'a dyn CommandRunner,
    renderer: TemplateRenderer,
    templates_dir: PathBuf,
    conf_dir: PathBuf,
}

impl<'a> MonitIntegrator<'a> {
    /// Creates an integrator using the well-known host locations.
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        MonitIntegrator {
            runner,
            renderer: TemplateRenderer::new(),
            templates_dir: PathBuf::from(paths::TEMPLATES_DIR),
            conf_dir: PathBuf::from(paths::MONIT_CONF_DIR),
        }
    }

    /// Overrides the template directory.
    pub fn templates_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.templates_dir = dir.into();
        self
    }

    /// Overrides the monitor fragment directory.
    pub fn conf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = dir.into();
        self
    }

    /// The path of the monitor fragment of `feature`.
    pub fn conf_path(&self, feature: &str) -> PathBuf {
        self.conf_dir.join(format!("monit_{feature}"))
    }

    /// Generates the monitor fragment of a package and reloads the monitor.
    ///
    /// Packages without monitored processes generate no fragment and
    /// trigger no reload.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the monitor reload fails.
    pub fn install(&self, manifest: &Manifest) -> Result<(), Error> {
        if manifest.processes.is_empty() {
            return Ok(());
        }

        let feature = &manifest.service.name;
        let conf = self.conf_path(feature);
        self.renderer.render_to_file(
            &self.templates_dir.join(MONIT_CONF_TEMPLATE),
            &conf,
            &MonitContext {
                feature,
                processes: &manifest.processes,
            },
        )?;
        info!("Generated {}", conf.display());
        self.reload_monitor()
    }

    /// Removes the monitor fragment of a feature and reloads the monitor.
    ///
    /// A missing fragment is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing fragment cannot be removed or the
    /// monitor reload fails.
    pub fn uninstall(&self, feature: &str) -> Result<(), Error> {
        let conf = self.conf_path(feature);
        if conf.exists() {
            fs::remove_file(&conf).map_err(|source| Error::IoPath {
                path: conf.clone(),
                context: "removing a monitor fragment",
                source,
            })?;
            info!("Removed {}", conf.display());
        }
        self.reload_monitor()
    }

    /// Reloads the monitor daemon.
    fn reload_monitor(&self) -> Result<(), Error> {
        self.runner.run("systemctl", &["reload", "monit"])?;
        Ok(())
    }
}
