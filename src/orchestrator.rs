//! Bring-up and tear-down of the VM, share daemon, and credentials.
//!
//! `up` is strictly sequential and fails fast: the VM must be running and
//! the share daemon reachable before the share can be mounted, and the VM
//! must be reachable over SSH before credentials can be fetched. Nothing is
//! rolled back on failure; `halt` and `destroy` are the recovery path.
//! Teardown is best-effort and attempts every step.

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{DinghyConfig, Layout};
use crate::credentials::{CredentialError, CredentialInstaller};
use crate::environment::{EnvironmentReport, ExpectedEnvironment};
use crate::process::{CommandRunner, ProcessCommandRunner};
use crate::readiness::{ConnectProbe, ReadinessWaiter, TcpProbe};
use crate::share::{ServiceDescriptor, ShareError, ShareService};
use crate::vm::{VmError, VmHandle, VmService};

/// Errors surfaced by the lifecycle operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Raised when a VM supervisor step fails.
    #[error(transparent)]
    Vm(#[from] VmError),
    /// Raised when a share daemon step fails.
    #[error(transparent)]
    Share(#[from] ShareError),
    /// Raised when installing credentials fails.
    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

/// Outcome of a halt where both steps were attempted.
#[derive(Debug, Default)]
pub struct HaltReport {
    /// VM stop failure, reported as a warning.
    pub vm: Option<VmError>,
    /// Share daemon halt failure.
    pub share: Option<ShareError>,
}

impl HaltReport {
    /// Returns `true` when both steps succeeded.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.vm.is_none() && self.share.is_none()
    }

    /// Converts the report into a result. VM stop failures are warnings
    /// and do not turn the halt into an error.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Share`] when the share daemon could not
    /// be halted.
    pub fn into_result(self) -> Result<(), OrchestratorError> {
        self.share.map_or(Ok(()), |err| Err(err.into()))
    }
}

/// Composes the VM, share daemon, credential, and environment steps.
#[derive(Debug)]
pub struct Orchestrator<R: CommandRunner, P: ConnectProbe> {
    vm: VmService<R>,
    share: ShareService<R, P>,
    credentials: CredentialInstaller,
    environment: ExpectedEnvironment,
}

impl Orchestrator<ProcessCommandRunner, TcpProbe> {
    /// Wires the real process runner and TCP probe for `layout`.
    #[must_use]
    pub fn from_config(config: &DinghyConfig, layout: &Layout) -> Self {
        let waiter = ReadinessWaiter::tcp()
            .with_timeout(config.readiness_timeout())
            .with_poll_interval(config.readiness_poll_interval());
        Self::new(
            VmService::with_process_runner(
                VmHandle::new(layout.vagrant_dir.clone()),
                config.vagrant_bin.clone(),
            ),
            ShareService::new(
                ServiceDescriptor::from_layout(layout),
                config.launchctl_bin.clone(),
                ProcessCommandRunner,
                waiter,
            ),
            CredentialInstaller::new(layout.cert_dir.clone()),
            ExpectedEnvironment::new(&config.docker_host, &layout.cert_dir),
        )
    }
}

impl<R: CommandRunner, P: ConnectProbe> Orchestrator<R, P> {
    /// Creates an orchestrator from its collaborators.
    #[must_use]
    pub const fn new(
        vm: VmService<R>,
        share: ShareService<R, P>,
        credentials: CredentialInstaller,
        environment: ExpectedEnvironment,
    ) -> Self {
        Self {
            vm,
            share,
            credentials,
            environment,
        }
    }

    /// Starts the VM and share daemon, mounts the share, installs
    /// credentials, and checks the client environment read via `lookup`.
    ///
    /// # Errors
    ///
    /// Returns the first step's error; earlier steps are left in place.
    pub async fn up<F>(&self, lookup: F) -> Result<EnvironmentReport, OrchestratorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.vm.up()?;
        self.share.up().await?;
        self.vm.mount_share(self.share.descriptor())?;
        let written = self.credentials.install(&self.vm)?;
        info!(count = written.len(), dir = %self.credentials.dest_dir(), "Installed Docker credentials");
        Ok(self.environment.check(lookup))
    }

    /// Stops the VM and the share daemon, attempting both regardless of
    /// either outcome.
    pub fn halt(&self) -> HaltReport {
        let vm = self.vm.halt().err();
        if let Some(err) = &vm {
            warn!(error = %err, "VM did not halt cleanly");
        }
        let share = self.share.halt().err();
        HaltReport { vm, share }
    }

    /// Halts everything and then destroys the VM. The destroy command is
    /// issued even when the halt reported failures.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Vm`] when the destroy fails, otherwise
    /// the halt's error if any.
    pub fn destroy(&self) -> Result<(), OrchestratorError> {
        let halted = self.halt();
        match (self.vm.destroy(), halted.into_result()) {
            (Err(err), Err(halt_err)) => {
                warn!(error = %halt_err, "halt also failed");
                Err(err.into())
            }
            (Err(err), Ok(())) => Err(err.into()),
            (Ok(()), halt_result) => halt_result,
        }
    }
}
