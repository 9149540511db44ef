//! The `ordo verify` subcommand.
//!
//! Verifies a release attestation against expected values. Facts without a
//! flag are not checked; a flag given an empty value asserts the fact is
//! unset.

use std::path::PathBuf;
use std::process;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr, eyre};
use ordo_attest::{AttestationError, AttestationVerifier, Check};
use ordo_policy::DigestSet;

use crate::config::Config;

/// Arguments for `ordo verify`.
#[derive(Args)]
pub struct VerifyArgs {
    /// Path to the release attestation JSON file.
    pub attestation: PathBuf,

    /// Expected creator identity.
    #[arg(long)]
    pub creator_id: Option<String>,

    /// Expected package identity.
    #[arg(long)]
    pub package: String,

    /// Digests the attested subject must contain, e.g. `sha256:<hex>`.
    #[arg(long, value_name = "ALG:HEX")]
    pub digest: DigestSet,

    /// Expected creator version.
    #[arg(long)]
    pub creator_version: Option<String>,

    /// Expected SLSA build level.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub level: Option<u8>,

    /// Minimum SLSA build level.
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=4))]
    pub min_level: Option<u8>,

    /// Expected policy reference, as `name=uri@alg:hex[,alg:hex]` (repeatable).
    #[arg(long, value_name = "NAME=URI@DIGESTS", value_parser = parse_policy_check)]
    pub policy: Vec<Check>,

    /// Expected package version.
    #[arg(long)]
    pub package_version: Option<String>,

    /// Expected deployment environment.
    #[arg(long)]
    pub environment: Option<String>,

    /// Output results as JSON.
    #[arg(long)]
    pub json: bool,
}

impl VerifyArgs {
    /// Checks in the order they are applied.
    fn checks(&self) -> Vec<Check> {
        let mut checks = Vec::new();
        if let Some(version) = &self.creator_version {
            checks.push(Check::CreatorVersion(version.clone()));
        }
        if let Some(level) = self.level {
            checks.push(Check::SlsaBuildLevel(level));
        }
        if let Some(level) = self.min_level {
            checks.push(Check::SlsaBuildLevelAtLeast(level));
        }
        checks.extend(self.policy.iter().cloned());
        if let Some(version) = &self.package_version {
            checks.push(Check::PackageVersion(version.clone()));
        }
        if let Some(env) = &self.environment {
            checks.push(Check::Environment(env.clone()));
        }
        checks
    }
}

/// Parse `name=uri@alg:hex[,alg:hex]` into a policy check.
fn parse_policy_check(s: &str) -> Result<Check, String> {
    let (name, rest) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=URI@DIGESTS, got `{s}`"))?;
    let (uri, digests) = rest
        .rsplit_once('@')
        .ok_or_else(|| format!("expected NAME=URI@DIGESTS, got `{s}`"))?;
    if name.is_empty() || uri.is_empty() {
        return Err(format!("policy name and uri must be non-empty in `{s}`"));
    }
    let digests: DigestSet = digests.parse().map_err(|e| format!("{e}"))?;
    Ok(Check::Policy {
        name: name.to_owned(),
        uri: uri.to_owned(),
        digests,
    })
}

/// Execute the verify command.
pub fn execute(args: &VerifyArgs, config: &Config) -> Result<()> {
    let creator_id = args
        .creator_id
        .clone()
        .or_else(|| config.creator_id.clone())
        .ok_or_else(|| eyre!("no creator id: pass --creator-id or set `creator_id`"))?;

    let data = std::fs::read(&args.attestation)
        .wrap_err_with(|| format!("failed to read `{}`", args.attestation.display()))?;

    let checks = args.checks();
    let result = AttestationVerifier::from_slice(&data)
        .and_then(|v| v.verify(&creator_id, &args.digest, &args.package, &checks));
    tracing::debug!(checks = checks.len(), passed = result.is_ok(), "verified attestation");

    if args.json {
        let report = serde_json::json!({
            "passed": result.is_ok(),
            "error": result.as_ref().err().map(ToString::to_string),
            "kind": result.as_ref().err().map(error_kind),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &result {
            Ok(()) => println!("Verification PASSED"),
            Err(e) => println!("Verification FAILED: {e}"),
        }
    }

    if result.is_err() {
        process::exit(1);
    }

    Ok(())
}

const fn error_kind(error: &AttestationError) -> &'static str {
    match error {
        AttestationError::InvalidField(_) => "invalid_field",
        AttestationError::InvalidInput(_) => "invalid_input",
        AttestationError::Mismatch(_) => "mismatch",
        AttestationError::Internal(_) => "internal",
        AttestationError::Io(_) => "io",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_policy_check() {
        let check = parse_policy_check("org=file:///etc/ordo/org.json@sha256:aa,sha512:bb")
            .expect("parse");
        let Check::Policy { name, uri, digests } = check else {
            panic!("expected a policy check");
        };
        assert_eq!(name, "org");
        assert_eq!(uri, "file:///etc/ordo/org.json");
        assert_eq!(digests.get("sha512"), Some("bb"));
    }

    #[test]
    fn policy_uri_may_contain_at_signs() {
        let check = parse_policy_check("p=git+https://host/repo@main@sha256:aa").expect("parse");
        assert!(matches!(check, Check::Policy { uri, .. } if uri == "git+https://host/repo@main"));
    }

    #[test]
    fn rejects_malformed_policy_checks() {
        for bad in ["org", "org=file:///x", "=file:///x@sha256:aa", "org=@sha256:aa", "org=u@sha256"] {
            assert!(parse_policy_check(bad).is_err(), "{bad}");
        }
    }
}
