//! The commandline interface definition.

use clap::{ArgAction, Parser, Subcommand};

/// The SONiC package manager commandline interface.
#[derive(Debug, Parser)]
#[command(name = "sonic-package-manager", about = "SONiC Package Manager", version)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace output).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// The command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// The available top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Repository management commands.
    Repository {
        /// The repository command to run.
        #[command(subcommand)]
        command: RepositoryCommand,
    },

    /// List available repositories.
    List,

    /// Package inspection commands.
    Package {
        /// The package command to run.
        #[command(subcommand)]
        command: PackageCommand,
    },

    /// Install a package.
    Install {
        /// The package to install, either NAME or NAME==VERSION.
        package: String,

        /// Turn failing checks into warnings.
        #[arg(long)]
        force: bool,

        /// Do not ask for confirmation.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Uninstall a package.
    ///
    /// A partially uninstalled package can be cleaned up by re-running with
    /// --force.
    Uninstall {
        /// The package to uninstall.
        name: String,

        /// Turn failing checks into warnings.
        #[arg(long)]
        force: bool,

        /// Do not ask for confirmation.
        #[arg(short = 'y', long)]
        yes: bool,
    },
}

/// Repository management commands.
#[derive(Debug, Subcommand)]
pub enum RepositoryCommand {
    /// Add a new repository to the index.
    Add {
        /// The unique repository name.
        name: String,

        /// The container image reference to pull from.
        repository: String,

        /// A human readable description.
        #[arg(long)]
        description: Option<String>,

        /// The version installed when none is requested explicitly.
        #[arg(long)]
        default_version: Option<String>,
    },

    /// Remove a repository from the index.
    Remove {
        /// The repository name.
        name: String,
    },
}

/// Package inspection commands.
#[derive(Debug, Subcommand)]
pub enum PackageCommand {
    /// Show package details.
    Show {
        /// What to show.
        #[command(subcommand)]
        command: ShowCommand,
    },
}

/// Package detail commands.
#[derive(Debug, Subcommand)]
pub enum ShowCommand {
    /// Print the manifest of an installed package.
    Manifest {
        /// The package name.
        name: String,
    },

    /// Print the changelog of an installed package.
    Changelog {
        /// The package name.
        name: String,
    },
}
