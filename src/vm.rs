//! Virtual machine lifecycle through the `vagrant` supervisor.
//!
//! The supervisor owns all VM state; [`VmService`] only issues commands from
//! the Vagrant project directory and interprets their exit codes.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{info, warn};

use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::share::ServiceDescriptor;

/// Errors raised by VM supervisor commands.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum VmError {
    /// Raised when the supervisor binary does not answer a version probe.
    #[error("{program} is not installed or not usable: {message}")]
    ToolUnavailable {
        /// Supervisor binary that was probed.
        program: String,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the VM fails to start.
    #[error("there was an error bringing up the Vagrant box: {message}")]
    Start {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the VM fails to stop.
    #[error("failed to halt the Vagrant box: {message}")]
    Stop {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the VM cannot be destroyed.
    #[error("failed to destroy the Vagrant box: {message}")]
    Destroy {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when mounting the host share inside the VM fails.
    #[error("failed mounting NFS share {mount_dir}: {message}")]
    Mount {
        /// Directory that could not be mounted.
        mount_dir: Utf8PathBuf,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when a file cannot be read from inside the VM.
    #[error("error contacting the Vagrant box while reading {path}: {message}")]
    RemoteFetch {
        /// Path inside the VM.
        path: String,
        /// Human-readable description of the failure.
        message: String,
    },
}

/// Working directory in which VM supervisor commands execute.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VmHandle {
    working_dir: Utf8PathBuf,
}

impl VmHandle {
    /// Creates a handle for the Vagrant project in `working_dir`.
    #[must_use]
    pub fn new(working_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    /// Returns the Vagrant project directory.
    #[must_use]
    pub fn working_dir(&self) -> &Utf8Path {
        &self.working_dir
    }
}

/// Drives the VM through the supervisor CLI.
#[derive(Clone, Debug)]
pub struct VmService<R: CommandRunner> {
    handle: VmHandle,
    vagrant_bin: String,
    runner: R,
}

impl VmService<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    #[must_use]
    pub fn with_process_runner(handle: VmHandle, vagrant_bin: impl Into<String>) -> Self {
        Self::new(handle, vagrant_bin, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> VmService<R> {
    /// Creates a service issuing `vagrant_bin` commands through `runner`.
    #[must_use]
    pub fn new(handle: VmHandle, vagrant_bin: impl Into<String>, runner: R) -> Self {
        Self {
            handle,
            vagrant_bin: vagrant_bin.into(),
            runner,
        }
    }

    /// Returns the handle the service operates on.
    #[must_use]
    pub const fn handle(&self) -> &VmHandle {
        &self.handle
    }

    /// Probes the supervisor with `--version`.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::ToolUnavailable`] when the probe cannot run or
    /// exits unsuccessfully.
    pub fn check_tool(&self) -> Result<(), VmError> {
        let unavailable = |message: String| VmError::ToolUnavailable {
            program: self.vagrant_bin.clone(),
            message,
        };
        let output = self
            .runner
            .run(&self.vagrant_bin, &args(&["--version"]), None)
            .map_err(|err| unavailable(err.to_string()))?;
        if output.is_success() {
            Ok(())
        } else {
            Err(unavailable(format!(
                "version probe exited with status {}",
                output.status_text()
            )))
        }
    }

    /// Starts the VM. A failed tool probe is only warned about.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Start`] when `vagrant up` fails.
    pub fn up(&self) -> Result<(), VmError> {
        if let Err(err) = self.check_tool() {
            warn!(
                error = %err,
                "Vagrant is not installed. Please install Vagrant before continuing: https://www.vagrantup.com"
            );
        }

        info!("Starting the Vagrant box");
        self.interactive(&["up"])
            .map_err(|message| VmError::Start { message })
    }

    /// Stops the VM.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Stop`] when `vagrant halt` fails.
    pub fn halt(&self) -> Result<(), VmError> {
        info!("Halting the Vagrant box");
        self.interactive(&["halt"])
            .map_err(|message| VmError::Stop { message })
    }

    /// Halts and then destroys the VM. The halt outcome never prevents the
    /// destroy command from being issued.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Destroy`] when `vagrant destroy` fails.
    pub fn destroy(&self) -> Result<(), VmError> {
        if let Err(err) = self.halt() {
            warn!(error = %err, "continuing with destroy after failed halt");
        }

        info!("Destroying the Vagrant box");
        self.interactive(&["destroy"])
            .map_err(|message| VmError::Destroy { message })
    }

    /// Mounts the host share described by `share` inside the VM.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::Mount`] when the remote mount command fails.
    pub fn mount_share(&self, share: &ServiceDescriptor) -> Result<(), VmError> {
        let mount_dir = share.mount_dir();
        info!(%mount_dir, "Mounting NFS share");
        let command = mount_command(share);
        let failed = |message: String| VmError::Mount {
            mount_dir: mount_dir.to_path_buf(),
            message,
        };

        let output = self
            .runner
            .run(&self.vagrant_bin, &ssh_args(&command), Some(self.handle.working_dir()))
            .map_err(|err| failed(err.to_string()))?;
        if output.is_success() {
            Ok(())
        } else {
            Err(failed(format!(
                "mount exited with status {}: {}",
                output.status_text(),
                output.stderr.trim()
            )))
        }
    }

    /// Reads `path` inside the VM and returns its raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::RemoteFetch`] when the remote read fails.
    pub fn fetch_file(&self, path: &str) -> Result<Vec<u8>, VmError> {
        let failed = |message: String| VmError::RemoteFetch {
            path: path.to_owned(),
            message,
        };
        let command = format!("cat {}", escape(path.into()));
        let output = self
            .runner
            .run(&self.vagrant_bin, &ssh_args(&command), Some(self.handle.working_dir()))
            .map_err(|err| failed(err.to_string()))?;
        if output.is_success() {
            Ok(output.stdout)
        } else {
            Err(failed(format!(
                "remote read exited with status {}",
                output.status_text()
            )))
        }
    }

    fn interactive(&self, subcommand: &[&str]) -> Result<(), String> {
        let outcome = self
            .runner
            .run_interactive(
                &self.vagrant_bin,
                &args(subcommand),
                Some(self.handle.working_dir()),
            )
            .map_err(|err| err.to_string())?;
        if outcome.is_success() {
            Ok(())
        } else {
            Err(format!(
                "vagrant {} exited with status {}",
                subcommand.join(" "),
                outcome.status_text()
            ))
        }
    }
}

/// Builds the remote mount command for `share`.
///
/// NFSv3 over TCP with the mount protocol on the same port as NFS, no lock
/// manager, and interruptible hard mounts.
#[must_use]
pub fn mount_command(share: &ServiceDescriptor) -> String {
    let port = share.mount_port();
    let host = share.host_address();
    let dir = escape(share.mount_dir().as_str().into());
    format!(
        "sudo mount -t nfs {host}:{dir} {dir} -o nfsvers=3,tcp,mountport={port},port={port},nolock,hard,intr"
    )
}

fn ssh_args(command: &str) -> Vec<OsString> {
    vec![
        OsString::from("ssh"),
        OsString::from("--"),
        OsString::from(command),
    ]
}

fn args(values: &[&str]) -> Vec<OsString> {
    values.iter().map(OsString::from).collect()
}
