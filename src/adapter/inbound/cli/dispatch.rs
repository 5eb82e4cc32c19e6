//! Command dispatch.

use super::command::{Cli, Commands};
use super::output::{self, OutputConfig};
use super::{check, run, status};
use crate::error::Result;

/// Apply global flags and run the selected command.
pub async fn execute(cli: Cli) -> Result<()> {
    output::configure(OutputConfig::new(cli.json, cli.quiet), &cli.color);

    match &cli.command {
        Commands::Run => run::execute(&cli.config).await,
        Commands::Check => check::execute(&cli.config),
        Commands::Status(args) => status::execute(&cli.config, args),
    }
}
