//! Lifecycle of the NFS share daemon under `launchctl`.
//!
//! The daemon is registered by linking its static launch agent definition
//! into the user's `LaunchAgents` directory. The link doubles as the
//! installed-marker: when it exists the agent is considered loaded, and
//! halting unloads the agent before removing the link.

use std::ffi::OsString;
use std::io;
use std::net::{IpAddr, SocketAddr};

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Layout;
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::readiness::{ConnectProbe, ReadinessError, ReadinessWaiter, TcpProbe};

/// Errors raised while managing the share daemon.
#[derive(Debug, Error)]
pub enum ShareError {
    /// Raised when `launchctl load` fails.
    #[error("could not start the NFS daemon: {message}")]
    ServiceStart {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when `launchctl unload` fails.
    #[error("could not stop the NFS daemon: {message}")]
    ServiceStop {
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when the installed-marker cannot be inspected or changed.
    #[error("failed to access {path}: {message}")]
    Filesystem {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the daemon never accepts connections.
    #[error("NFS daemon did not become ready: {0}")]
    Readiness(#[from] ReadinessError),
}

impl ShareError {
    fn filesystem(path: &Utf8Path, err: &io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Identifies the share daemon's service definition and network endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceDescriptor {
    definition: Utf8PathBuf,
    marker: Utf8PathBuf,
    mount_dir: Utf8PathBuf,
    host_address: IpAddr,
    mount_port: u16,
}

impl ServiceDescriptor {
    /// Creates a descriptor from explicit locations.
    #[must_use]
    pub fn new(
        definition: impl Into<Utf8PathBuf>,
        marker: impl Into<Utf8PathBuf>,
        mount_dir: impl Into<Utf8PathBuf>,
        host_address: IpAddr,
        mount_port: u16,
    ) -> Self {
        Self {
            definition: definition.into(),
            marker: marker.into(),
            mount_dir: mount_dir.into(),
            host_address,
            mount_port,
        }
    }

    /// Builds the descriptor for a resolved [`Layout`].
    #[must_use]
    pub fn from_layout(layout: &Layout) -> Self {
        Self::new(
            layout.service_definition.clone(),
            layout.service_marker.clone(),
            layout.mount_dir.clone(),
            layout.host_ip,
            layout.nfs_port,
        )
    }

    /// Static launch agent definition.
    #[must_use]
    pub fn definition(&self) -> &Utf8Path {
        &self.definition
    }

    /// Installed-marker path.
    #[must_use]
    pub fn marker(&self) -> &Utf8Path {
        &self.marker
    }

    /// Host directory exported to the VM.
    #[must_use]
    pub fn mount_dir(&self) -> &Utf8Path {
        &self.mount_dir
    }

    /// Host-side bind address.
    #[must_use]
    pub const fn host_address(&self) -> IpAddr {
        self.host_address
    }

    /// NFS and mount protocol port.
    #[must_use]
    pub const fn mount_port(&self) -> u16 {
        self.mount_port
    }

    /// Endpoint probed for readiness.
    #[must_use]
    pub const fn control_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.host_address, self.mount_port)
    }

    /// Returns `true` when the installed-marker exists. Dangling links count
    /// as present.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Filesystem`] when the marker's directory cannot
    /// be inspected.
    pub fn is_installed(&self) -> Result<bool, ShareError> {
        let Some((parent, name)) = split(&self.marker) else {
            return Ok(false);
        };
        let dir = match Dir::open_ambient_dir(parent, ambient_authority()) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(ShareError::filesystem(parent, &err)),
        };
        match dir.symlink_metadata(name) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(ShareError::filesystem(&self.marker, &err)),
        }
    }

    fn install_marker(&self) -> Result<(), ShareError> {
        if let Some(parent) = self.marker.parent() {
            Dir::create_ambient_dir_all(parent, ambient_authority())
                .map_err(|err| ShareError::filesystem(parent, &err))?;
        }
        // cap-std refuses link targets outside the opened directory.
        std::os::unix::fs::symlink(&self.definition, &self.marker)
            .map_err(|err| ShareError::filesystem(&self.marker, &err))
    }

    fn remove_marker(&self) -> Result<(), ShareError> {
        let Some((parent, name)) = split(&self.marker) else {
            return Ok(());
        };
        let dir = Dir::open_ambient_dir(parent, ambient_authority())
            .map_err(|err| ShareError::filesystem(parent, &err))?;
        match dir.remove_file(name) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ShareError::filesystem(&self.marker, &err)),
        }
    }
}

fn split(path: &Utf8Path) -> Option<(&Utf8Path, &str)> {
    Some((path.parent()?, path.file_name()?))
}

/// Installs, starts, and stops the share daemon.
#[derive(Clone, Debug)]
pub struct ShareService<R: CommandRunner, P: ConnectProbe> {
    descriptor: ServiceDescriptor,
    launchctl_bin: String,
    runner: R,
    waiter: ReadinessWaiter<P>,
}

impl ShareService<ProcessCommandRunner, TcpProbe> {
    /// Convenience constructor wiring the real process runner and TCP probe.
    #[must_use]
    pub fn with_defaults(descriptor: ServiceDescriptor, launchctl_bin: impl Into<String>) -> Self {
        Self::new(
            descriptor,
            launchctl_bin,
            ProcessCommandRunner,
            ReadinessWaiter::tcp(),
        )
    }
}

impl<R: CommandRunner, P: ConnectProbe> ShareService<R, P> {
    /// Creates a service using the provided runner and readiness waiter.
    #[must_use]
    pub fn new(
        descriptor: ServiceDescriptor,
        launchctl_bin: impl Into<String>,
        runner: R,
        waiter: ReadinessWaiter<P>,
    ) -> Self {
        Self {
            descriptor,
            launchctl_bin: launchctl_bin.into(),
            runner,
            waiter,
        }
    }

    /// Returns the managed service descriptor.
    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Host directory the VM should mount.
    #[must_use]
    pub fn mount_dir(&self) -> &Utf8Path {
        self.descriptor.mount_dir()
    }

    /// Clears any previous installation, registers and starts the daemon,
    /// and waits until it accepts connections.
    ///
    /// A start failure leaves the marker in place for the next halt.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::ServiceStart`] when `launchctl load` fails,
    /// [`ShareError::Readiness`] when the daemon never becomes reachable, and
    /// [`ShareError::Filesystem`] when the marker cannot be managed.
    pub async fn up(&self) -> Result<(), ShareError> {
        self.halt()?;

        self.descriptor.install_marker()?;
        self.start()?;
        self.wait_ready().await
    }

    /// Unloads the daemon and removes the marker. Does nothing when the
    /// marker is absent; a failing unload is only warned about.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Filesystem`] when the marker cannot be removed.
    pub fn halt(&self) -> Result<(), ShareError> {
        if !self.descriptor.is_installed()? {
            return Ok(());
        }

        info!("Stopping NFS daemon");
        if let Err(err) = self.stop() {
            warn!(error = %err, "removing the launch agent anyway");
        }
        self.descriptor.remove_marker()
    }

    /// Blocks until the daemon's control port accepts a connection.
    ///
    /// # Errors
    ///
    /// Returns [`ShareError::Readiness`] when the deadline elapses or the
    /// probe fails unexpectedly.
    pub async fn wait_ready(&self) -> Result<(), ShareError> {
        info!("Waiting for NFS daemon");
        self.waiter
            .wait(self.descriptor.control_endpoint())
            .await
            .map_err(ShareError::from)
    }

    fn start(&self) -> Result<(), ShareError> {
        self.launchctl("load")
            .map_err(|message| ShareError::ServiceStart { message })
    }

    fn stop(&self) -> Result<(), ShareError> {
        self.launchctl("unload")
            .map_err(|message| ShareError::ServiceStop { message })
    }

    fn launchctl(&self, action: &str) -> Result<(), String> {
        let args = [
            OsString::from(action),
            OsString::from(self.descriptor.marker().as_str()),
        ];
        let output = self
            .runner
            .run(&self.launchctl_bin, &args, None)
            .map_err(|err| err.to_string())?;
        if output.is_success() {
            Ok(())
        } else {
            Err(format!(
                "{} {action} exited with status {}: {}",
                self.launchctl_bin,
                output.status_text(),
                output.stderr.trim()
            ))
        }
    }
}
