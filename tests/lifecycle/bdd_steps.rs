//! BDD step definitions for the VM lifecycle.

use dinghy::test_support::{AcceptingProbe, RefusingProbe};
use dinghy::{ConnectProbe, OrchestratorError};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::{Builder, Runtime};

use super::test_helpers::{LifecycleContext, LifecycleResult};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a fresh workstation")]
fn fresh_workstation(lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context
}

#[given("the NFS daemon never accepts connections")]
fn daemon_never_ready(mut lifecycle_context: LifecycleContext) -> LifecycleContext {
    lifecycle_context.daemon_ready = false;
    lifecycle_context
}

#[given("a stale NFS launch agent is installed")]
fn stale_launch_agent(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let marker = lifecycle_context.marker();
    let parent = marker
        .parent()
        .ok_or_else(|| StepError::Assertion(format!("{marker} has no parent")))?;
    std::fs::create_dir_all(parent).map_err(|err| StepError::Assertion(err.to_string()))?;
    std::os::unix::fs::symlink(lifecycle_context.definition(), &marker)
        .map_err(|err| StepError::Assertion(err.to_string()))?;
    Ok(lifecycle_context)
}

#[given("the command \"{pattern}\" fails")]
fn command_fails(lifecycle_context: LifecycleContext, pattern: String) -> LifecycleContext {
    lifecycle_context.runner.fail_with_exit_code(&pattern, 1);
    lifecycle_context
}

#[when("I bring the VM up")]
fn bring_up(lifecycle_context: LifecycleContext) -> Result<LifecycleContext, StepError> {
    let runtime = paused_runtime()?;
    let result = if lifecycle_context.daemon_ready {
        run_up(&runtime, &lifecycle_context, AcceptingProbe)
    } else {
        run_up(&runtime, &lifecycle_context, RefusingProbe::new())
    };
    Ok(record(lifecycle_context, result))
}

#[when("I halt the VM")]
fn halt(lifecycle_context: LifecycleContext) -> LifecycleContext {
    let result = lifecycle_context
        .orchestrator(AcceptingProbe)
        .halt()
        .into_result();
    match lifecycle_context.outcome {
        Some(LifecycleResult::Failure(_)) => lifecycle_context,
        _ => record(lifecycle_context, result),
    }
}

#[when("I destroy the VM")]
fn destroy(lifecycle_context: LifecycleContext) -> LifecycleContext {
    let result = lifecycle_context.orchestrator(AcceptingProbe).destroy();
    record(lifecycle_context, result)
}

#[then("the lifecycle succeeds")]
fn lifecycle_succeeds(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    match lifecycle_context.outcome {
        Some(LifecycleResult::Success) => Ok(()),
        Some(LifecycleResult::Failure(ref message)) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the lifecycle fails with \"{fragment}\"")]
fn lifecycle_fails(lifecycle_context: &LifecycleContext, fragment: String) -> Result<(), StepError> {
    let Some(LifecycleResult::Failure(message)) = &lifecycle_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected failure outcome",
        )));
    };
    if message.contains(&fragment) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure mentioning {fragment:?}, got: {message}"
        )))
    }
}

#[then("the commands ran in order \"{patterns}\"")]
fn commands_in_order(
    lifecycle_context: &LifecycleContext,
    patterns: String,
) -> Result<(), StepError> {
    let runner = &lifecycle_context.runner;
    let positions = patterns
        .split(',')
        .map(|pattern| {
            runner.position_of(pattern).ok_or_else(|| {
                StepError::Assertion(format!(
                    "{pattern:?} never ran; commands: {:?}",
                    runner.commands()
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    if positions.is_sorted() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "commands ran out of order: {:?}",
            runner.commands()
        )))
    }
}

#[then("no command matching \"{pattern}\" ran")]
fn command_not_run(lifecycle_context: &LifecycleContext, pattern: String) -> Result<(), StepError> {
    if lifecycle_context.runner.ran(&pattern) {
        Err(StepError::Assertion(format!(
            "{pattern:?} should not have run; commands: {:?}",
            lifecycle_context.runner.commands()
        )))
    } else {
        Ok(())
    }
}

#[then("the credential files \"{names}\" are installed")]
fn credentials_installed(
    lifecycle_context: &LifecycleContext,
    names: String,
) -> Result<(), StepError> {
    let cert_dir = lifecycle_context.cert_dir();
    for name in names.split(',') {
        let contents = std::fs::read(cert_dir.join(name))
            .map_err(|err| StepError::Assertion(format!("{name} missing: {err}")))?;
        if contents.is_empty() {
            return Err(StepError::Assertion(format!("{name} is empty")));
        }
    }
    Ok(())
}

#[then("the credential file \"{name}\" is missing")]
fn credential_missing(lifecycle_context: &LifecycleContext, name: String) -> Result<(), StepError> {
    if lifecycle_context.cert_dir().join(&name).exists() {
        Err(StepError::Assertion(format!("{name} should not be written")))
    } else {
        Ok(())
    }
}

#[then("the NFS launch agent is installed")]
fn launch_agent_installed(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if marker_present(lifecycle_context) {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "launch agent link should exist",
        )))
    }
}

#[then("the NFS launch agent is not installed")]
fn launch_agent_removed(lifecycle_context: &LifecycleContext) -> Result<(), StepError> {
    if marker_present(lifecycle_context) {
        Err(StepError::Assertion(String::from(
            "launch agent link should be removed",
        )))
    } else {
        Ok(())
    }
}

fn marker_present(lifecycle_context: &LifecycleContext) -> bool {
    std::fs::symlink_metadata(lifecycle_context.marker()).is_ok()
}

fn paused_runtime() -> Result<Runtime, StepError> {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Assertion(err.to_string()))
}

fn run_up<P: ConnectProbe>(
    runtime: &Runtime,
    lifecycle_context: &LifecycleContext,
    probe: P,
) -> Result<(), OrchestratorError> {
    let orchestrator = lifecycle_context.orchestrator(probe);
    runtime
        .block_on(orchestrator.up(|_| None))
        .map(|_report| ())
}

fn record(
    mut lifecycle_context: LifecycleContext,
    result: Result<(), OrchestratorError>,
) -> LifecycleContext {
    lifecycle_context.outcome = Some(match result {
        Ok(()) => LifecycleResult::Success,
        Err(err) => LifecycleResult::Failure(err.to_string()),
    });
    lifecycle_context
}
