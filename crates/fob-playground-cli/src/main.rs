//! fob-playground CLI - link playground projects outside the browser.
//!
//! Parses arguments, installs logging, loads configuration and dispatches to
//! the selected command.

use clap::Parser;
use fob_playground_cli::{cli, commands, config::CliConfig, error};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    fob_playground::init_logging(args.log_level());

    // Convert CLI errors to miette diagnostics
    run(args).await.map_err(error::cli_error_to_miette)
}

async fn run(args: cli::Cli) -> error::Result<()> {
    let config = CliConfig::load(&args)?;
    match args.command {
        cli::Command::Build(build_args) => commands::build_execute(build_args, &config).await,
        cli::Command::Types(types_args) => commands::types_execute(types_args, &config).await,
    }
}
