// Copyright (c) 2026 Keel Contributors. MIT License.
// See LICENSE for details.

//! # Keel Vault Simulator
//!
//! Entry point for the `keel` binary. Parses CLI arguments, initializes
//! logging and metrics, and replays a scenario against a vault wired to
//! in-memory collaborators.
//!
//! The binary supports three subcommands:
//!
//! - `run`     : execute a scenario and print the JSON report
//! - `validate`: parse and sanity-check a scenario
//! - `version` : print build version information

mod cli;
mod logging;
mod metrics;
mod scenario;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Commands, KeelCli};
use metrics::VaultMetrics;
use scenario::{Scenario, Simulation};

fn main() -> Result<()> {
    let cli = KeelCli::parse();

    match cli.command {
        Commands::Run(args) => run_scenario(args),
        Commands::Validate(args) => validate_scenario(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Replays a scenario and prints the report on stdout.
fn run_scenario(args: cli::RunArgs) -> Result<()> {
    logging::init_logging(&args.log, args.log_format);

    let scenario = Scenario::load(&args.scenario)?;
    scenario.validate().context("scenario failed validation")?;
    tracing::info!(
        scenario = %scenario.name,
        path = %args.scenario.display(),
        steps = scenario.steps.len(),
        "starting run"
    );

    let metrics = VaultMetrics::new().context("failed to register metrics")?;
    let simulation = Simulation::build(&scenario)?;
    let report = simulation.run(&scenario.name, &scenario.steps, &metrics)?;

    let committed = report.steps.iter().filter(|s| s.is_committed()).count();
    tracing::info!(
        committed,
        rejected = report.steps.len() - committed,
        life = simulation.vault().life(),
        "run finished"
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to encode report")?
    );
    if args.metrics {
        eprint!("{}", metrics.encode().context("failed to encode metrics")?);
    }
    Ok(())
}

fn validate_scenario(args: cli::ValidateArgs) -> Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    scenario.validate().context("scenario failed validation")?;
    println!(
        "{}: ok ({} steps)",
        args.scenario.display(),
        scenario.steps.len()
    );
    Ok(())
}

fn print_version() {
    println!(
        "keel {} (vault version {})",
        env!("CARGO_PKG_VERSION"),
        keel_protocol::config::CURRENT_VAULT_VERSION,
    );
}
