//! Command-line interface definitions.
//!
//! Defines the CLI structure for the keeper using `clap`: one long-running
//! `run` command plus two offline helpers for operators.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Order matching and exchange-rate oracle keeper
#[derive(Parser, Debug)]
#[command(name = "augmint-keeper")]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    /// Color output mode [auto, always, never]
    #[arg(
        long,
        global = true,
        default_value = "auto",
        hide_possible_values = true
    )]
    pub color: ColorChoice,

    /// JSON output for scripting
    #[arg(long, global = true)]
    pub json: bool,

    /// Decrease output verbosity
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Color output mode for terminal rendering.
#[derive(Clone, Debug, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect automatically
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the node and run the enabled jobs until signalled
    Run,

    /// Validate the configuration and print a summary
    Check,

    /// Print the status file written by a running keeper
    Status(StatusArgs),
}

#[derive(clap::Args, Debug, Default)]
pub struct StatusArgs {
    /// Status file to read (defaults to `status.path` from the config)
    #[arg(long)]
    pub file: Option<PathBuf>,
}
