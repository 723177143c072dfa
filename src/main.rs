//! Binary entry point for the dinghy CLI.

use std::env;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use dinghy::config::home_dir;
use dinghy::{
    ConfigError, DinghyConfig, EnvironmentReport, Orchestrator, OrchestratorError,
    ProcessCommandRunner,
};

mod cli;

use cli::{Cli, Command};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Lifecycle(#[from] OrchestratorError),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match dispatch(cli.command).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "dinghy=debug" } else { "dinghy=info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

async fn dispatch(command: Command) -> Result<(), CliError> {
    let config = DinghyConfig::load_without_cli_args()?;
    let home = home_dir()?;
    let layout = config.resolve_layout(&home, &ProcessCommandRunner)?;
    let orchestrator = Orchestrator::from_config(&config, &layout);

    match command {
        Command::Up => {
            let report = orchestrator.up(|name| env::var(name).ok()).await?;
            write_report(io::stdout(), &report);
            Ok(())
        }
        Command::Halt => Ok(orchestrator.halt().into_result()?),
        Command::Destroy => Ok(orchestrator.destroy()?),
    }
}

fn write_report(mut target: impl Write, report: &EnvironmentReport) {
    writeln!(target, "{report}").ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
