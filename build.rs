//! Build script rendering the `dinghy` man pages.
//!
//! Writes `dinghy.1` for the top-level command and `dinghy-<command>.1` for
//! each lifecycle subcommand into the build output directory.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

const CLI_SOURCE: &str = "src/cli/mod.rs";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed={CLI_SOURCE}")?;

    let out_dir = PathBuf::from(
        env::var_os("OUT_DIR")
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "OUT_DIR was not set"))?,
    );

    let command = Cli::command();
    let name = command.get_name().to_owned();
    render(&out_dir, &name, command.clone())?;
    for subcommand in command.get_subcommands() {
        let page = format!("{name}-{}", subcommand.get_name());
        render(&out_dir, &page, subcommand.clone())?;
    }

    Ok(())
}

fn render(out_dir: &Path, page: &str, command: Command) -> io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).title(page).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{page}.1")), buffer)
}
