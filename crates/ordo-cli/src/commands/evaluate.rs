//! The `ordo evaluate` subcommand.
//!
//! Evaluates a release against the organization and project policies and,
//! when the release is allowed, writes a release attestation.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::Args;
use color_eyre::eyre::{Result, WrapErr, eyre};
use ordo_attest::{CreationOption, PolicyReference};
use ordo_policy::{
    DigestSet, Evaluation, OrganizationPolicy, PolicyError, ProjectPolicy, ProjectPolicySet,
    ReleasePolicy,
};

use crate::config::Config;
use crate::provenance::ProvenanceFileVerifier;

/// Arguments for `ordo evaluate`.
#[derive(Args)]
pub struct EvaluateArgs {
    /// Package identity to evaluate.
    #[arg(long)]
    pub package: String,

    /// Artifact digests, e.g. `sha256:<hex>[,sha512:<hex>]`.
    #[arg(long, value_name = "ALG:HEX")]
    pub digest: DigestSet,

    /// Deployment environment, required by environment-scoped policies.
    #[arg(long)]
    pub environment: Option<String>,

    /// SLSA provenance statement for the artifact.
    #[arg(long, value_name = "PATH")]
    pub provenance: PathBuf,

    /// Organization policy file.
    #[arg(long, value_name = "PATH")]
    pub org: Option<PathBuf>,

    /// Directory of project policy files (`*.json`).
    #[arg(long, value_name = "DIR")]
    pub projects: Option<PathBuf>,

    /// Creator identity recorded in the attestation.
    #[arg(long)]
    pub creator_id: Option<String>,

    /// Creator version recorded in the attestation.
    #[arg(long)]
    pub creator_version: Option<String>,

    /// Package version recorded in the attestation.
    #[arg(long)]
    pub package_version: Option<String>,

    /// Override the granted SLSA level (0-4).
    #[arg(long, value_name = "LEVEL")]
    pub slsa_level: Option<i64>,

    /// Lock the granted level; combining with `--slsa-level` fails.
    #[arg(long)]
    pub safe_mode: bool,

    /// Write the attestation here instead of stdout.
    #[arg(long, short, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print the summary as JSON (with `--output`).
    #[arg(long)]
    pub json: bool,
}

/// A project policy file and the reference to record for it.
struct ProjectFile {
    policy: ProjectPolicy,
    reference: PolicyReference,
}

/// Execute the evaluate command.
pub fn execute(args: &EvaluateArgs, config: &Config) -> Result<()> {
    let org_path = args
        .org
        .clone()
        .or_else(|| config.organization_policy.clone())
        .ok_or_else(|| eyre!("no organization policy: pass --org or set `organization_policy`"))?;
    let projects_dir = args
        .projects
        .clone()
        .or_else(|| config.project_policies.clone())
        .ok_or_else(|| eyre!("no project policies: pass --projects or set `project_policies`"))?;
    let creator_id = args
        .creator_id
        .clone()
        .or_else(|| config.creator_id.clone())
        .ok_or_else(|| eyre!("no creator id: pass --creator-id or set `creator_id`"))?;

    let org_bytes = std::fs::read(&org_path)
        .wrap_err_with(|| format!("failed to read `{}`", org_path.display()))?;
    let organization = OrganizationPolicy::from_slice(&org_bytes)
        .wrap_err_with(|| format!("invalid organization policy `{}`", org_path.display()))?;
    let org_reference = policy_reference(&org_path, &org_bytes)?;

    let (projects, files) = load_projects(&projects_dir, &organization)?;
    let release_policy = ReleasePolicy::new(organization, projects);

    let verifier = ProvenanceFileVerifier::new(args.provenance.clone());
    let evaluation = match release_policy.evaluate(
        &args.digest,
        &args.package,
        args.environment.as_deref(),
        &verifier,
    ) {
        Ok(evaluation) => evaluation,
        Err(e) => {
            if args.json {
                let report = serde_json::json!({
                    "passed": false,
                    "error": e.to_string(),
                    "kind": error_kind(&e),
                });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Evaluation FAILED: {e}");
            }
            process::exit(1);
        }
    };

    let minimum = release_policy.organization().minimum_slsa_level();
    let below_minimum = evaluation.level.is_some_and(|l| l.get() < minimum.get());
    if below_minimum {
        tracing::warn!(
            package = %evaluation.package,
            minimum = %minimum,
            "granted level is below the organization minimum"
        );
    }

    let mut references = BTreeMap::from([("org".to_owned(), org_reference)]);
    if let Some(file) = files.iter().find(|f| governs(&f.policy, &evaluation)) {
        references.insert("project".to_owned(), file.reference.clone());
    }

    let mut options = vec![CreationOption::Policy(references)];
    if let Some(version) = args
        .creator_version
        .clone()
        .or_else(|| config.creator_version.clone())
    {
        options.push(CreationOption::CreatorVersion(version));
    }
    if let Some(version) = args.package_version.clone() {
        options.push(CreationOption::PackageVersion(version));
    }
    if args.safe_mode {
        options.push(CreationOption::SafeMode);
    }
    if let Some(level) = args.slsa_level {
        options.push(CreationOption::SlsaLevel(level));
    }

    let attestation = ordo_attest::create(&evaluation, &creator_id, options)?;
    let bytes = attestation.to_bytes()?;

    let Some(output) = &args.output else {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&bytes)?;
        writeln!(stdout)?;
        return Ok(());
    };

    std::fs::write(output, &bytes)
        .wrap_err_with(|| format!("failed to write `{}`", output.display()))?;
    let level = attestation
        .predicate
        .property(ordo_attest::statement::SLSA_BUILD_LEVEL_PROPERTY)
        .cloned()
        .unwrap_or_default();

    if args.json {
        let report = serde_json::json!({
            "passed": true,
            "package": evaluation.package,
            "environment": evaluation.environment,
            "slsa_level": level,
            "below_minimum": below_minimum,
            "attestation": output,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Evaluation PASSED: `{}` granted SLSA build level {level}",
            evaluation.package
        );
        if below_minimum {
            println!("Warning: organization requires at least level {minimum}");
        }
        println!("Attestation written to {}", output.display());
    }

    Ok(())
}

const fn error_kind(error: &PolicyError) -> &'static str {
    match error {
        PolicyError::InvalidField(_) => "invalid_field",
        PolicyError::InvalidInput(_) => "invalid_input",
        PolicyError::NotFound(_) => "not_found",
        PolicyError::Mismatch(_) => "mismatch",
        PolicyError::Verification { .. } => "verification",
        PolicyError::Internal(_) => "internal",
        PolicyError::Io(_) => "io",
    }
}

/// Load every `*.json` file in `dir`, in file name order.
fn load_projects(
    dir: &Path,
    organization: &OrganizationPolicy,
) -> Result<(ProjectPolicySet, Vec<ProjectFile>)> {
    let mut paths = std::fs::read_dir(dir)
        .wrap_err_with(|| format!("failed to read project policies in `{}`", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    paths.retain(|p| p.extension().is_some_and(|ext| ext == "json"));
    paths.sort();

    let known_builders = organization.builder_names();
    let mut set = ProjectPolicySet::default();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = std::fs::read(&path)
            .wrap_err_with(|| format!("failed to read `{}`", path.display()))?;
        let policy = ProjectPolicy::from_slice(&bytes, &known_builders)
            .wrap_err_with(|| format!("invalid project policy `{}`", path.display()))?;
        set.insert(policy.clone())
            .wrap_err_with(|| format!("conflicting project policy `{}`", path.display()))?;
        files.push(ProjectFile {
            policy,
            reference: policy_reference(&path, &bytes)?,
        });
    }
    tracing::info!(dir = %dir.display(), count = files.len(), "loaded project policies");
    Ok((set, files))
}

fn policy_reference(path: &Path, bytes: &[u8]) -> Result<PolicyReference> {
    let absolute = path
        .canonicalize()
        .wrap_err_with(|| format!("failed to resolve `{}`", path.display()))?;
    Ok(PolicyReference {
        uri: format!("file://{}", absolute.display()),
        digest: DigestSet::sha256_of(bytes),
    })
}

/// Whether `policy` is the one `evaluation` was resolved against.
fn governs(policy: &ProjectPolicy, evaluation: &Evaluation) -> bool {
    if policy.package != evaluation.package {
        return false;
    }
    match (&policy.environments, &evaluation.environment) {
        (None, None) => true,
        (Some(envs), Some(env)) => envs.contains(env),
        _ => false,
    }
}
