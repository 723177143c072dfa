//! Command-line interface definitions for the `dinghy` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `dinghy` binary.
#[derive(Debug, Parser)]
#[command(
    name = "dinghy",
    about = "Docker on a Vagrant VM with NFS-shared home directory",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Log every external command at debug level.
    #[arg(long, short, global = true)]
    pub(crate) verbose: bool,
    /// Lifecycle operation to perform.
    #[command(subcommand)]
    pub(crate) command: Command,
}

/// Lifecycle operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Subcommand)]
pub(crate) enum Command {
    /// Start the Docker VM and NFS service.
    #[command(name = "up", about = "Start the Docker VM and NFS service")]
    Up,
    /// Stop the VM and NFS service.
    #[command(name = "halt", about = "Stop the VM and NFS")]
    Halt,
    /// Stop and delete all traces of the VM.
    #[command(name = "destroy", about = "Stop and delete all traces of the VM")]
    Destroy,
}
