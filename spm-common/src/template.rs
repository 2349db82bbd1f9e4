//! Template rendering.
//!
//! The bodies of generated unit files, control scripts and monitor
//! fragments are inputs shipped on the host; only the rendering contexts
//! are part of the package manager contract.

use std::{fmt, fs, path::Path};

use handlebars::Handlebars;
use serde::Serialize;

use crate::Error;

/// Renders handlebars templates from the host template directory.
pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl TemplateRenderer {
    /// Creates a renderer with non-strict lookup, so templates may ignore
    /// parts of the rendering context.
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);
        TemplateRenderer { registry }
    }

    /// Renders the template file at `template` with `context`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be read or rendered.
    pub fn render<T: Serialize>(&self, template: &Path, context: &T) -> Result<String, Error> {
        let body = fs::read_to_string(template).map_err(|source| Error::IoPath {
            path: template.to_path_buf(),
            context: "reading template",
            source,
        })?;
        self.registry
            .render_template(&body, context)
            .map_err(|source| Error::Template {
                path: template.to_path_buf(),
                source: Box::new(source),
            })
    }

    /// Renders the template file at `template` with `context` into `output`.
    ///
    /// The output file is written directly; callers that need a commit point
    /// (e.g. unit files) rely on the supervisor reload instead.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails or the output cannot be written.
    pub fn render_to_file<T: Serialize>(
        &self,
        template: &Path,
        output: &Path,
        context: &T,
    ) -> Result<(), Error> {
        let rendered = self.render(template, context)?;
        fs::write(output, rendered).map_err(|source| Error::IoPath {
            path: output.to_path_buf(),
            context: "writing rendered template",
            source,
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        TemplateRenderer::new()
    }
}

impl fmt::Debug for TemplateRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateRenderer").finish_non_exhaustive()
    }
}
