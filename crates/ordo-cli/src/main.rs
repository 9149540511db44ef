//! Ordo CLI — release policy evaluation and SLSA release attestations.
//!
//! Evaluate a release against organization and project policies, emit a
//! release attestation, and verify attestations later on.

mod commands;
mod config;
mod provenance;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use crate::config::Config;

/// Ordo — release policy evaluation and SLSA release attestations.
#[derive(Parser)]
#[command(name = "ordo", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the user config directory).
    #[arg(long, value_name = "PATH", env = "ORDO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (repeat for more detail: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output logs as JSON (for machine consumption).
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Evaluate a release against policy and emit a release attestation.
    Evaluate(commands::evaluate::EvaluateArgs),
    /// Verify a release attestation against expected values.
    Verify(commands::verify::VerifyArgs),
    /// Display a release attestation in human-readable format.
    Inspect(commands::inspect::InspectArgs),
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // Logs go to stderr so attestations on stdout stay clean.
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Evaluate(args) => commands::evaluate::execute(&args, &config),
        Commands::Verify(args) => commands::verify::execute(&args, &config),
        Commands::Inspect(args) => commands::inspect::execute(&args),
    }
}
