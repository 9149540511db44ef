//! CLI configuration file.
//!
//! Optional TOML file providing defaults for command-line flags. Looked up
//! at `--config` / `$ORDO_CONFIG` if given, otherwise in the XDG config
//! directory (`~/.config/ordo/config.toml` on Linux). A missing default file
//! is not an error; a missing explicit file is.
//!
//! ```toml
//! creator_id = "https://ordo.example.com/release-controller"
//! creator_version = "v1.0.0"
//! organization_policy = "/etc/ordo/org.json"
//! project_policies = "/etc/ordo/projects"
//! ```

use std::path::{Path, PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;

/// Defaults for command-line flags.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    /// Creator identity recorded in and expected of attestations.
    pub(crate) creator_id: Option<String>,
    /// Creator version recorded in attestations.
    pub(crate) creator_version: Option<String>,
    /// Path to the organization policy.
    pub(crate) organization_policy: Option<PathBuf>,
    /// Directory holding project policies (`*.json`).
    pub(crate) project_policies: Option<PathBuf>,
}

impl Config {
    /// Load the configuration.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config `{}`", path.display()))?;
        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("invalid config `{}`", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "ordo", "ordo")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_keys() {
        let config: Config = toml::from_str(
            r#"
            creator_id = "https://ordo.dev/creator"
            creator_version = "v1"
            organization_policy = "/etc/ordo/org.json"
            project_policies = "/etc/ordo/projects"
            "#,
        )
        .expect("parse");
        assert_eq!(config.creator_id.as_deref(), Some("https://ordo.dev/creator"));
        assert_eq!(
            config.project_policies.as_deref(),
            Some(Path::new("/etc/ordo/projects"))
        );
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").expect("parse");
        assert!(config.creator_id.is_none());
        assert!(config.organization_policy.is_none());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("creator = \"x\"").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/ordo/config.toml"))).is_err());
    }
}
