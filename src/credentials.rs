//! Installation of the Docker TLS credentials generated inside the VM.

use std::fmt;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;
use tracing::info;

use crate::process::CommandRunner;
use crate::vm::{VmError, VmService};

/// Directory inside the VM holding the Docker daemon's client credentials.
pub const REMOTE_CREDENTIAL_DIR: &str = ".docker";

/// Errors raised while installing credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// Raised when a credential cannot be read from the VM.
    #[error("failed to fetch the {kind}: {source}")]
    Fetch {
        /// Credential that could not be fetched.
        kind: CredentialKind,
        /// Underlying VM error.
        #[source]
        source: VmError,
    },
    /// Raised when the VM returned no content for a credential.
    #[error("the VM returned an empty {kind}")]
    EmptyPayload {
        /// Credential with no content.
        kind: CredentialKind,
    },
    /// Raised when the local credential directory cannot be written.
    #[error("failed to write {path}: {message}")]
    Filesystem {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

impl CredentialError {
    fn filesystem(path: &Utf8Path, err: &io::Error) -> Self {
        Self::Filesystem {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// One of the three files needed for TLS-authenticated Docker access.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CredentialKind {
    /// Client private key.
    Key,
    /// Certificate authority certificate.
    CaCertificate,
    /// Client certificate.
    ClientCertificate,
}

impl CredentialKind {
    /// File name used both inside the VM and in the credential directory.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Key => "key.pem",
            Self::CaCertificate => "ca.pem",
            Self::ClientCertificate => "cert.pem",
        }
    }

    /// Path of the credential inside the VM.
    #[must_use]
    pub fn remote_path(self) -> String {
        format!("{REMOTE_CREDENTIAL_DIR}/{}", self.file_name())
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Key => "private key",
            Self::CaCertificate => "CA certificate",
            Self::ClientCertificate => "client certificate",
        };
        f.write_str(label)
    }
}

/// Ordered credentials to install: key, CA certificate, client certificate.
#[derive(Clone, Copy, Debug, Default)]
pub struct CredentialSet;

impl CredentialSet {
    /// Credentials in installation order.
    pub const KINDS: [CredentialKind; 3] = [
        CredentialKind::Key,
        CredentialKind::CaCertificate,
        CredentialKind::ClientCertificate,
    ];

    /// Destination paths of the full set under `dest_dir`.
    #[must_use]
    pub fn destinations(dest_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
        Self::KINDS
            .iter()
            .map(|kind| dest_dir.join(kind.file_name()))
            .collect()
    }
}

/// Source of files living inside the VM.
pub trait RemoteFileSource {
    /// Returns the raw content of `path` inside the VM.
    ///
    /// # Errors
    ///
    /// Returns [`VmError::RemoteFetch`] when the file cannot be read.
    fn fetch_file(&self, path: &str) -> Result<Vec<u8>, VmError>;
}

impl<R: CommandRunner> RemoteFileSource for VmService<R> {
    fn fetch_file(&self, path: &str) -> Result<Vec<u8>, VmError> {
        Self::fetch_file(self, path)
    }
}

/// Copies the credential set from the VM into a local directory.
#[derive(Clone, Debug)]
pub struct CredentialInstaller {
    dest_dir: Utf8PathBuf,
}

impl CredentialInstaller {
    /// Creates an installer writing into `dest_dir`.
    #[must_use]
    pub fn new(dest_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dest_dir: dest_dir.into(),
        }
    }

    /// Directory receiving the credentials.
    #[must_use]
    pub fn dest_dir(&self) -> &Utf8Path {
        &self.dest_dir
    }

    /// Fetches each credential in order and writes it verbatim, replacing
    /// existing files. Stops at the first failure; credentials written
    /// before it stay in place.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Fetch`] when the VM cannot be read,
    /// [`CredentialError::EmptyPayload`] when a credential is empty, and
    /// [`CredentialError::Filesystem`] when local writes fail.
    pub fn install<S: RemoteFileSource>(
        &self,
        source: &S,
    ) -> Result<Vec<Utf8PathBuf>, CredentialError> {
        Dir::create_ambient_dir_all(&self.dest_dir, ambient_authority())
            .map_err(|err| CredentialError::filesystem(&self.dest_dir, &err))?;
        let dir = Dir::open_ambient_dir(&self.dest_dir, ambient_authority())
            .map_err(|err| CredentialError::filesystem(&self.dest_dir, &err))?;

        let mut written = Vec::with_capacity(CredentialSet::KINDS.len());
        for kind in CredentialSet::KINDS {
            let target = self.dest_dir.join(kind.file_name());
            info!(%target, "Writing credential");
            let contents = source
                .fetch_file(&kind.remote_path())
                .map_err(|err| CredentialError::Fetch { kind, source: err })?;
            if contents.is_empty() {
                return Err(CredentialError::EmptyPayload { kind });
            }
            dir.write(kind.file_name(), &contents)
                .map_err(|err| CredentialError::filesystem(&target, &err))?;
            written.push(target);
        }
        Ok(written)
    }
}
