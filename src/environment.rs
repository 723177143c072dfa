//! Advisory check of the Docker client environment variables.
//!
//! The check never sets variables; it only reports what the user should
//! export so the Docker client reaches the daemon in the VM over TLS.

use std::fmt;

use camino::Utf8Path;

/// Variable naming the Docker endpoint.
pub const DOCKER_HOST: &str = "DOCKER_HOST";
/// Variable naming the credential directory.
pub const DOCKER_CERT_PATH: &str = "DOCKER_CERT_PATH";
/// Variable enabling TLS verification.
pub const DOCKER_TLS_VERIFY: &str = "DOCKER_TLS_VERIFY";

/// A single expected variable assignment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EnvVar {
    /// Variable name.
    pub name: &'static str,
    /// Required value.
    pub value: String,
}

/// Expected values for the Docker client variables, in display order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExpectedEnvironment {
    vars: [EnvVar; 3],
}

impl ExpectedEnvironment {
    /// Builds the expectation for `docker_host` and the credential directory.
    #[must_use]
    pub fn new(docker_host: &str, cert_dir: &Utf8Path) -> Self {
        Self {
            vars: [
                EnvVar {
                    name: DOCKER_HOST,
                    value: docker_host.to_owned(),
                },
                EnvVar {
                    name: DOCKER_CERT_PATH,
                    value: cert_dir.to_string(),
                },
                EnvVar {
                    name: DOCKER_TLS_VERIFY,
                    value: String::from("1"),
                },
            ],
        }
    }

    /// Expected assignments in display order.
    #[must_use]
    pub const fn vars(&self) -> &[EnvVar; 3] {
        &self.vars
    }

    /// Compares the expectation with the values returned by `lookup`.
    #[must_use]
    pub fn check<F>(&self, lookup: F) -> EnvironmentReport
    where
        F: Fn(&str) -> Option<String>,
    {
        let matches = self
            .vars
            .iter()
            .all(|var| lookup(var.name).as_deref() == Some(var.value.as_str()));
        if matches {
            EnvironmentReport::AlreadyCorrect
        } else {
            EnvironmentReport::Instructions(self.vars.to_vec())
        }
    }
}

/// Outcome of an environment check.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EnvironmentReport {
    /// Every variable already holds its expected value.
    AlreadyCorrect,
    /// At least one variable differs; carries every expected assignment.
    Instructions(Vec<EnvVar>),
}

impl fmt::Display for EnvironmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyCorrect => {
                write!(f, "Your environment variables are already set correctly.")
            }
            Self::Instructions(vars) => {
                write!(
                    f,
                    "To connect the Docker client to the Docker daemon, please set:"
                )?;
                for var in vars {
                    write!(f, "\n    export {}={}", var.name, var.value)?;
                }
                Ok(())
            }
        }
    }
}
