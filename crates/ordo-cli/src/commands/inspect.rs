//! The `ordo inspect` subcommand.
//!
//! Displays a release attestation in human-readable format.

use std::fmt::Write as _;
use std::path::PathBuf;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr};
use ordo_attest::Attestation;
use ordo_attest::statement::SLSA_BUILD_LEVEL_PROPERTY;

/// Arguments for `ordo inspect`.
#[derive(Args)]
pub struct InspectArgs {
    /// Path to the release attestation JSON file.
    pub attestation: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Execute the inspect command.
pub fn execute(args: &InspectArgs) -> Result<()> {
    let data = std::fs::read(&args.attestation)
        .wrap_err_with(|| format!("failed to read `{}`", args.attestation.display()))?;
    let attestation = Attestation::from_slice(&data)
        .wrap_err_with(|| format!("invalid attestation `{}`", args.attestation.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&attestation)?);
    } else {
        print!("{}", format_summary(&attestation));
    }
    Ok(())
}

fn format_summary(att: &Attestation) -> String {
    let predicate = &att.predicate;
    let mut out = String::new();

    let _ = writeln!(out, "Statement:      {}", att.statement_type);
    let _ = writeln!(out, "Predicate:      {}", att.predicate_type);
    let _ = writeln!(out, "Package:        {}", predicate.package.name);
    match &predicate.creator.version {
        Some(version) => {
            let _ = writeln!(out, "Creator:        {} ({version})", predicate.creator.id);
        }
        None => {
            let _ = writeln!(out, "Creator:        {}", predicate.creator.id);
        }
    }
    let _ = writeln!(out, "Created:        {}", predicate.creation_time.to_rfc3339());
    match predicate.property(SLSA_BUILD_LEVEL_PROPERTY) {
        Some(level) => {
            let _ = writeln!(out, "SLSA level:     {level}");
        }
        None => {
            let _ = writeln!(out, "SLSA level:     (none)");
        }
    }

    let _ = writeln!(out, "\nSubjects ({}):", att.subjects.len());
    for subject in &att.subjects {
        let _ = writeln!(
            out,
            "  {}  {}",
            subject.uri.as_deref().unwrap_or("-"),
            subject.digest
        );
    }

    if let Some(annotations) = &predicate.package.annotations {
        let _ = writeln!(out, "\nAnnotations:");
        for (key, value) in annotations {
            let _ = writeln!(out, "  {key} = {value}");
        }
    }

    if let Some(policies) = &predicate.policy {
        let _ = writeln!(out, "\nPolicies ({}):", policies.len());
        for (name, reference) in policies {
            let _ = writeln!(out, "  {name}: {}  {}", reference.uri, reference.digest);
        }
    }

    out
}
