//! # CLI Interface
//!
//! Defines the command-line argument structure for `keel` using `clap`
//! derive. Supports three subcommands: `run`, `validate`, and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// Keel collateral vault simulator.
///
/// Replays a scenario file against a vault wired to in-memory collaborators
/// and prints the resulting vault state as JSON.
#[derive(Parser, Debug)]
#[command(
    name = "keel",
    about = "Keel collateral vault simulator",
    version,
    propagate_version = true
)]
pub struct KeelCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `keel` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a scenario and print the final vault summary.
    Run(RunArgs),
    /// Parse and sanity-check a scenario without executing it.
    Validate(ValidateArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "KEEL_SCENARIO")]
    pub scenario: PathBuf,

    /// Also render Prometheus metrics (text format) to stderr after the run.
    #[arg(long)]
    pub metrics: bool,

    /// Log output format.
    #[arg(long, env = "KEEL_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default log filter. `RUST_LOG` takes precedence when set.
    #[arg(
        long,
        env = "KEEL_LOG",
        default_value = "keel=info,keel_contracts=info,keel_protocol=info"
    )]
    pub log: String,
}

/// Arguments for the `validate` subcommand.
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to the scenario file (JSON).
    #[arg(long, short = 's', env = "KEEL_SCENARIO")]
    pub scenario: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        KeelCli::command().debug_assert();
    }

    #[test]
    fn run_defaults_to_pretty_logs() {
        let cli = KeelCli::parse_from(["keel", "run", "--scenario", "s.json"]);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.log_format, LogFormat::Pretty);
                assert!(!args.metrics);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
