//! The `sonic-package-manager` executable.

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use sonic_package_manager::{cli::Cli, commands};

/// The main entrypoint for the `sonic-package-manager` executable.
///
/// Returns [`ExitCode::SUCCESS`] if the chosen command succeeded. Returns
/// [`ExitCode::FAILURE`] and prints a single red line on stderr if it
/// failed; details are in the log at the configured verbosity.
fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if let Err(error) = SimpleLogger::init(level, Config::default()) {
        eprintln!("Failed to initialize the logger: {error}");
        return ExitCode::FAILURE;
    }

    if let Err(error) = commands::run(cli.command) {
        eprintln!("{}", error.to_string().red());
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
