//! External command execution behind a narrow runner abstraction.
//!
//! Every interaction with `vagrant` and `launchctl` goes through
//! [`CommandRunner`], so lifecycle services can be driven by fakes in tests.

use std::ffi::OsString;
use std::process::{Command, Stdio};

use camino::Utf8Path;
use thiserror::Error;
use tracing::debug;

/// Errors raised while launching an external command.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ProcessError {
    /// Raised when the program cannot be started at all.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Human-readable error message.
        message: String,
    },
}

/// Result of running an external command with captured output.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output, kept as raw bytes.
    pub stdout: Vec<u8>,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit code for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        status_text(self.code)
    }
}

/// Exit status of a command whose output was streamed to the terminal.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExitOutcome {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
}

impl ExitOutcome {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit code for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        status_text(self.code)
    }
}

fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown"), |value| value.to_string())
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with `args`, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the command cannot be started.
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<CommandOutput, ProcessError>;

    /// Runs `program` with `args`, streaming its output to the terminal.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Spawn`] if the command cannot be started.
    fn run_interactive(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<ExitOutcome, ProcessError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl ProcessCommandRunner {
    fn command(program: &str, args: &[OsString], working_dir: Option<&Utf8Path>) -> Command {
        debug!(program, ?args, ?working_dir, "running command");
        let mut command = Command::new(program);
        command.args(args);
        if let Some(dir) = working_dir {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(program: &str, err: &std::io::Error) -> ProcessError {
        ProcessError::Spawn {
            program: program.to_owned(),
            message: err.to_string(),
        }
    }
}

impl CommandRunner for ProcessCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<CommandOutput, ProcessError> {
        let output = Self::command(program, args, working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| Self::spawn_error(program, &err))?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn run_interactive(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<ExitOutcome, ProcessError> {
        let status = Self::command(program, args, working_dir)
            .status()
            .map_err(|err| Self::spawn_error(program, &err))?;

        Ok(ExitOutcome {
            code: status.code(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    #[test]
    fn run_captures_stdout_as_bytes() {
        let runner = ProcessCommandRunner;
        let output = runner
            .run("sh", &[OsString::from("-c"), OsString::from("printf 'a\\0b'")], None)
            .expect("sh should spawn");

        assert!(output.is_success());
        assert_eq!(output.stdout, b"a\0b".to_vec());
    }

    #[test]
    fn run_reports_non_zero_exit_as_data() {
        let runner = ProcessCommandRunner;
        let output = runner
            .run("sh", &[OsString::from("-c"), OsString::from("exit 3")], None)
            .expect("sh should spawn");

        assert!(!output.is_success());
        assert_eq!(output.code, Some(3));
        assert_eq!(output.status_text(), "3");
    }

    #[test]
    fn run_uses_working_directory() {
        let tmp = TempDir::new().expect("temp dir");
        let dir = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 temp dir");
        let runner = ProcessCommandRunner;
        let output = runner
            .run("pwd", &[], Some(&dir))
            .expect("pwd should spawn");

        let reported = String::from_utf8_lossy(&output.stdout);
        let expected = dir.canonicalize_utf8().expect("canonical temp dir");
        assert_eq!(reported.trim(), expected.as_str());
    }

    #[test]
    fn run_surfaces_spawn_failures() {
        let runner = ProcessCommandRunner;
        let err = runner
            .run("dinghy-definitely-missing-binary", &[], None)
            .expect_err("missing binary should fail");

        assert!(matches!(
            err,
            ProcessError::Spawn { ref program, .. } if program == "dinghy-definitely-missing-binary"
        ));
    }

    #[test]
    fn missing_exit_code_renders_unknown() {
        let outcome = ExitOutcome { code: None };
        assert!(!outcome.is_success());
        assert_eq!(outcome.status_text(), "unknown");
    }
}
