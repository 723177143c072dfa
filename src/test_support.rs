//! Test support utilities shared across unit and integration tests.

use std::cell::{Cell, RefCell};
use std::ffi::OsString;
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::process::{CommandOutput, CommandRunner, ExitOutcome, ProcessError};
use crate::readiness::{ConnectProbe, ProbeFuture};

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Working directory the command was asked to run in.
    pub working_dir: Option<Utf8PathBuf>,
    /// Whether output was streamed rather than captured.
    pub interactive: bool,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

#[derive(Clone, Debug)]
enum Scripted {
    Output(CommandOutput),
    SpawnFailure,
}

/// Command runner that answers from pattern-matched scripted responses.
///
/// Each invocation is matched against the registered patterns (substrings of
/// [`CommandInvocation::command_string`]); the most recently registered match
/// wins, and unmatched commands succeed with empty output. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    rules: Rc<RefCell<Vec<(String, Scripted)>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Returns the recorded invocations rendered as command strings.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.invocations
            .borrow()
            .iter()
            .map(CommandInvocation::command_string)
            .collect()
    }

    /// Returns the position of the first command containing `pattern`.
    #[must_use]
    pub fn position_of(&self, pattern: &str) -> Option<usize> {
        self.commands()
            .iter()
            .position(|command| command.contains(pattern))
    }

    /// Returns `true` when any recorded command contains `pattern`.
    #[must_use]
    pub fn ran(&self, pattern: &str) -> bool {
        self.position_of(pattern).is_some()
    }

    /// Answers commands containing `pattern` with captured `stdout`.
    pub fn respond_with_stdout(&self, pattern: &str, stdout: impl Into<Vec<u8>>) {
        self.push_rule(
            pattern,
            Scripted::Output(CommandOutput {
                code: Some(0),
                stdout: stdout.into(),
                stderr: String::new(),
            }),
        );
    }

    /// Answers commands containing `pattern` with a failing exit `code`.
    pub fn fail_with_exit_code(&self, pattern: &str, code: i32) {
        self.push_rule(
            pattern,
            Scripted::Output(CommandOutput {
                code: Some(code),
                stdout: Vec::new(),
                stderr: String::from("simulated failure"),
            }),
        );
    }

    /// Makes commands containing `pattern` fail to spawn.
    pub fn fail_to_spawn(&self, pattern: &str) {
        self.push_rule(pattern, Scripted::SpawnFailure);
    }

    fn push_rule(&self, pattern: &str, response: Scripted) {
        self.rules.borrow_mut().push((pattern.to_owned(), response));
    }

    fn respond(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
        interactive: bool,
    ) -> Result<CommandOutput, ProcessError> {
        let invocation = CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            working_dir: working_dir.map(Utf8Path::to_path_buf),
            interactive,
        };
        let command = invocation.command_string();
        self.invocations.borrow_mut().push(invocation);

        let scripted = self
            .rules
            .borrow()
            .iter()
            .rev()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        match scripted {
            Some(Scripted::Output(output)) => Ok(output),
            Some(Scripted::SpawnFailure) => Err(ProcessError::Spawn {
                program: program.to_owned(),
                message: String::from("simulated spawn failure"),
            }),
            None => Ok(CommandOutput {
                code: Some(0),
                stdout: Vec::new(),
                stderr: String::new(),
            }),
        }
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<CommandOutput, ProcessError> {
        self.respond(program, args, working_dir, false)
    }

    fn run_interactive(
        &self,
        program: &str,
        args: &[OsString],
        working_dir: Option<&Utf8Path>,
    ) -> Result<ExitOutcome, ProcessError> {
        self.respond(program, args, working_dir, true)
            .map(|output| ExitOutcome { code: output.code })
    }
}

/// Probe that accepts every connection attempt.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptingProbe;

impl ConnectProbe for AcceptingProbe {
    fn connect(&self, _addr: SocketAddr) -> ProbeFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// Probe that refuses every connection attempt, counting attempts.
#[derive(Clone, Debug, Default)]
pub struct RefusingProbe {
    attempts: Rc<Cell<u32>>,
}

impl RefusingProbe {
    /// Creates a probe with no recorded attempts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connection attempts made so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.get()
    }
}

impl ConnectProbe for RefusingProbe {
    fn connect(&self, _addr: SocketAddr) -> ProbeFuture<'_> {
        self.attempts.set(self.attempts.get() + 1);
        Box::pin(async { Err(io::Error::from(io::ErrorKind::ConnectionRefused)) })
    }
}
