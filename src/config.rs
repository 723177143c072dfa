//! Configuration loading via `ortho-config`.
//!
//! Defaults reproduce the stock Homebrew installation: the Vagrant project and
//! the share daemon's launch agent definition live under
//! `<brew prefix>/var/dinghy`, while the launch agent marker and the Docker
//! credentials live under the user's home directory.

use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::process::CommandRunner;

/// Address the share daemon binds on the host-only network.
pub const DEFAULT_HOST_IP: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 42, 1));

/// Port serving both NFS and mount requests.
pub const DEFAULT_NFS_PORT: u16 = 19321;

/// Docker endpoint forwarded from the VM.
pub const DEFAULT_DOCKER_HOST: &str = "tcp://127.0.0.1:2376";

const SERVICE_FILE_NAME: &str = "dinghy.unfs.plist";

/// Settings merged from defaults, `dinghy.toml`, and `DINGHY_*` variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "DINGHY",
    discovery(
        app_name = "dinghy",
        env_var = "DINGHY_CONFIG_PATH",
        config_file_name = "dinghy.toml",
        dotfile_name = ".dinghy.toml",
        project_file_name = "dinghy.toml"
    )
)]
pub struct DinghyConfig {
    /// Path to the `vagrant` executable.
    #[ortho_config(default = "vagrant".to_owned())]
    pub vagrant_bin: String,
    /// Path to the `launchctl` executable.
    #[ortho_config(default = "launchctl".to_owned())]
    pub launchctl_bin: String,
    /// Path to the `brew` executable, used to discover the install prefix.
    #[ortho_config(default = "brew".to_owned())]
    pub brew_bin: String,
    /// Homebrew prefix. When unset, `brew --prefix` is consulted.
    pub brew_prefix: Option<String>,
    /// Host-only address the share daemon listens on.
    #[ortho_config(default = DEFAULT_HOST_IP.to_string())]
    pub host_ip: String,
    /// Share daemon port for NFS and mount traffic.
    #[ortho_config(default = DEFAULT_NFS_PORT)]
    pub nfs_port: u16,
    /// Seconds to wait for the share daemon to accept connections.
    #[ortho_config(default = 20)]
    pub readiness_timeout_secs: u64,
    /// Milliseconds between refused readiness probes.
    #[ortho_config(default = 1000)]
    pub readiness_poll_interval_ms: u64,
    /// Docker endpoint the client should be pointed at.
    #[ortho_config(default = DEFAULT_DOCKER_HOST.to_owned())]
    pub docker_host: String,
    /// Credential directory. Defaults to `~/.dinghy/certs`.
    pub cert_dir: Option<String>,
}

/// Errors raised during configuration loading and path resolution.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Surfaces errors from the `ortho-config` loader or invalid values.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when `HOME` is unset or not valid UTF-8.
    #[error("HOME must be set to a UTF-8 path")]
    MissingHome,
    /// Raised when the Homebrew prefix cannot be determined.
    #[error("could not determine the Homebrew prefix: {0}")]
    BrewPrefix(String),
}

/// Concrete filesystem and network locations derived from configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Layout {
    /// Vagrant project directory in which VM commands run.
    pub vagrant_dir: Utf8PathBuf,
    /// Static launch agent definition for the share daemon.
    pub service_definition: Utf8PathBuf,
    /// Launch agent link whose presence marks the daemon as installed.
    pub service_marker: Utf8PathBuf,
    /// Host directory exported to, and mounted inside, the VM.
    pub mount_dir: Utf8PathBuf,
    /// Local directory receiving the Docker TLS credentials.
    pub cert_dir: Utf8PathBuf,
    /// Host-only address of the share daemon.
    pub host_ip: IpAddr,
    /// Share daemon port.
    pub nfs_port: u16,
}

impl DinghyConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("dinghy")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the readiness deadline.
    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_secs)
    }

    /// Returns the interval between refused readiness probes.
    #[must_use]
    pub const fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    /// Derives the concrete [`Layout`] for `home`, querying `brew --prefix`
    /// through `runner` when no prefix is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for an invalid host address and
    /// [`ConfigError::BrewPrefix`] when the prefix cannot be discovered.
    pub fn resolve_layout<R: CommandRunner>(
        &self,
        home: &Utf8Path,
        runner: &R,
    ) -> Result<Layout, ConfigError> {
        let host_ip = self
            .host_ip
            .trim()
            .parse::<IpAddr>()
            .map_err(|err| ConfigError::Parse(format!("host_ip {}: {err}", self.host_ip)))?;
        let brew_prefix = self.brew_prefix(runner)?;
        let state_dir = brew_prefix.join("var").join("dinghy");
        let cert_dir = self.cert_dir.as_deref().map_or_else(
            || home.join(".dinghy").join("certs"),
            |dir| Utf8PathBuf::from(expand_home(dir, home)),
        );

        Ok(Layout {
            vagrant_dir: state_dir.join("vagrant"),
            service_definition: state_dir.join(SERVICE_FILE_NAME),
            service_marker: home
                .join("Library")
                .join("LaunchAgents")
                .join(SERVICE_FILE_NAME),
            mount_dir: home.to_path_buf(),
            cert_dir,
            host_ip,
            nfs_port: self.nfs_port,
        })
    }

    fn brew_prefix<R: CommandRunner>(&self, runner: &R) -> Result<Utf8PathBuf, ConfigError> {
        if let Some(prefix) = self.brew_prefix.as_deref()
            && !prefix.trim().is_empty()
        {
            return Ok(Utf8PathBuf::from(prefix.trim()));
        }

        let output = runner
            .run(&self.brew_bin, &[OsString::from("--prefix")], None)
            .map_err(|err| ConfigError::BrewPrefix(err.to_string()))?;
        if !output.is_success() {
            return Err(ConfigError::BrewPrefix(format!(
                "{} --prefix exited with status {}",
                self.brew_bin,
                output.status_text()
            )));
        }

        let prefix = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if prefix.is_empty() {
            return Err(ConfigError::BrewPrefix(String::from(
                "brew --prefix printed nothing",
            )));
        }
        Ok(Utf8PathBuf::from(prefix))
    }
}

/// Reads the home directory from `HOME`.
///
/// # Errors
///
/// Returns [`ConfigError::MissingHome`] when the variable is unset, empty, or
/// not valid UTF-8.
pub fn home_dir() -> Result<Utf8PathBuf, ConfigError> {
    std::env::var("HOME")
        .ok()
        .filter(|home| !home.trim().is_empty())
        .map(Utf8PathBuf::from)
        .ok_or(ConfigError::MissingHome)
}

fn expand_home(path: &str, home: &Utf8Path) -> String {
    path.strip_prefix("~/")
        .map_or_else(|| path.to_owned(), |rest| format!("{home}/{rest}"))
}
