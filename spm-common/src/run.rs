//! The subprocess seam.
//!
//! Components that need to poke the host (supervisor reload, monitor
//! reload) do so through [`CommandRunner`], so tests can record invocations
//! instead of touching the system.

use std::process::{Command, Stdio};

use log::debug;

use crate::Error;

/// Runs host commands on behalf of the package manager.
pub trait CommandRunner: std::fmt::Debug {
    /// Runs `program` with `args` and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned or exits
    /// unsuccessfully.
    fn run(&self, program: &str, args: &[&str]) -> Result<(), Error>;
}

/// The [`CommandRunner`] used in production: spawns the actual process.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<(), Error> {
        let command_line = format!("{program} {}", args.join(" "));
        debug!("Running command '{command_line}'");

        let output = Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .map_err(|source| Error::CommandSpawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command: command_line,
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(())
    }
}
