//! Core library for the dinghy Docker VM tool.
//!
//! The crate brings up a Vagrant-managed VM running Docker, exports the
//! user's home directory to it through an NFS daemon supervised by
//! `launchctl`, and installs the TLS credentials the local Docker client
//! needs. [`Orchestrator`] sequences the `up`, `halt`, and `destroy`
//! lifecycles over the individual services.

pub mod config;
pub mod credentials;
pub mod environment;
pub mod orchestrator;
pub mod process;
pub mod readiness;
pub mod share;
pub mod test_support;
pub mod vm;

pub use config::{ConfigError, DinghyConfig, Layout};
pub use credentials::{CredentialError, CredentialInstaller, CredentialKind, CredentialSet};
pub use environment::{EnvironmentReport, ExpectedEnvironment};
pub use orchestrator::{HaltReport, Orchestrator, OrchestratorError};
pub use process::{CommandOutput, CommandRunner, ExitOutcome, ProcessCommandRunner, ProcessError};
pub use readiness::{ConnectProbe, ReadinessError, ReadinessWaiter, TcpProbe};
pub use share::{ServiceDescriptor, ShareError, ShareService};
pub use vm::{VmError, VmHandle, VmService};
