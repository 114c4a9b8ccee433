//! Labeler configuration.
//!
//! A single JSON document describes which release and backport versions the
//! PR description block may name, what the managed labels are called, and
//! which repository the bot is allowed to act on.
//!
//! Lookup order for [`LabelerConfig::load`]:
//! 1. `LABELER_CONFIG` environment variable
//! 2. `.github/labeler.json` in the current directory
//! 3. `labeler.json` in the current directory
//!
//! Defaults are used when no file is found.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Environment variable pointing at an explicit config file.
pub const ENV_LABELER_CONFIG: &str = "LABELER_CONFIG";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("repository guard must be in owner/repo form, got '{0}'")]
    InvalidRepository(String),

    #[error("duplicate accepted {kind} value '{value}'")]
    DuplicateValue { kind: &'static str, value: String },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Names of the labels the bot manages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelNames {
    pub triage: String,
    pub ready_for_review: String,
    pub stale: String,
    pub feature_branch: String,
    /// Prefix of the release family, including the separating space.
    pub release_prefix: String,
    /// Prefix of the backport family, including the separating space.
    pub backport_prefix: String,
}

impl Default for LabelNames {
    fn default() -> Self {
        Self {
            triage: "triage".to_string(),
            ready_for_review: "ready for review".to_string(),
            stale: "stale".to_string(),
            feature_branch: "feature-branch".to_string(),
            release_prefix: "release ".to_string(),
            backport_prefix: "backport ".to_string(),
        }
    }
}

impl LabelNames {
    /// Label name for a release version, e.g. `release 1.4`.
    #[must_use]
    pub fn release(&self, version: &str) -> String {
        format!("{}{version}", self.release_prefix)
    }

    /// Label name for a backport version, e.g. `backport 1.3`.
    #[must_use]
    pub fn backport(&self, version: &str) -> String {
        format!("{}{version}", self.backport_prefix)
    }

    #[must_use]
    pub fn is_release(&self, label: &str) -> bool {
        label.starts_with(&self.release_prefix)
    }

    #[must_use]
    pub fn is_backport(&self, label: &str) -> bool {
        label.starts_with(&self.backport_prefix)
    }
}

/// Dependabot update granularity, ordered from least to most disruptive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateType {
    SemverPatch,
    SemverMinor,
    SemverMajor,
}

impl UpdateType {
    /// Parse the `update-type` value Dependabot writes into commit metadata,
    /// e.g. `version-update:semver-minor`.
    #[must_use]
    pub fn from_metadata(value: &str) -> Option<Self> {
        match value.trim().trim_start_matches("version-update:") {
            "semver-patch" => Some(Self::SemverPatch),
            "semver-minor" => Some(Self::SemverMinor),
            "semver-major" => Some(Self::SemverMajor),
            _ => None,
        }
    }
}

/// Pull request merge strategy used when enabling auto-merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMethod {
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    /// GraphQL enum spelling.
    #[must_use]
    pub const fn as_graphql(&self) -> &'static str {
        match self {
            Self::Merge => "MERGE",
            Self::Squash => "SQUASH",
            Self::Rebase => "REBASE",
        }
    }
}

/// Dependabot auto-merge policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DependabotConfig {
    pub enabled: bool,
    /// Largest update type that is merged without a human.
    pub max_update_type: UpdateType,
    pub merge_method: MergeMethod,
    pub author: String,
}

impl Default for DependabotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_update_type: UpdateType::SemverMinor,
            merge_method: MergeMethod::Squash,
            author: "dependabot[bot]".to_string(),
        }
    }
}

/// Top-level labeler configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LabelerConfig {
    /// Only events from this `owner/repo` are acted on. Empty disables the guard.
    pub repository: String,
    /// Release versions a description block may request, in display order.
    pub accepted_releases: Vec<String>,
    /// Backport versions a description block may request, in display order.
    pub accepted_backports: Vec<String>,
    pub labels: LabelNames,
    pub stale_after_hours: u64,
    pub artifact_retention_days: u64,
    pub check_run_name: String,
    pub dependabot: DependabotConfig,
}

impl Default for LabelerConfig {
    fn default() -> Self {
        Self {
            repository: String::new(),
            accepted_releases: Vec::new(),
            accepted_backports: Vec::new(),
            labels: LabelNames::default(),
            stale_after_hours: 24,
            artifact_retention_days: 1,
            check_run_name: "PR description labels".to_string(),
            dependabot: DependabotConfig::default(),
        }
    }
}

impl LabelerConfig {
    /// Load configuration from standard locations, falling back to defaults.
    ///
    /// # Errors
    /// Returns an error if a file is found but cannot be read or parsed, or
    /// if the loaded config fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(ENV_LABELER_CONFIG) {
            let config = Self::load_from_path(Path::new(&path))?;
            info!(path = %path, "Loaded labeler config from {ENV_LABELER_CONFIG}");
            return Ok(config);
        }

        let locations = [
            PathBuf::from(".github/labeler.json"),
            PathBuf::from("labeler.json"),
        ];

        for path in &locations {
            if path.exists() {
                let config = Self::load_from_path(path)?;
                info!(path = %path.display(), "Loaded labeler config");
                return Ok(config);
            }
        }

        info!("No labeler config found, using defaults");
        Ok(Self::default())
    }

    /// Load and validate configuration from a specific path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        debug!(
            releases = config.accepted_releases.len(),
            backports = config.accepted_backports.len(),
            "Config validated"
        );
        Ok(config)
    }

    /// Check structural constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.repository.is_empty() {
            let mut parts = self.repository.split('/');
            let well_formed = matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(owner), Some(repo), None) if !owner.is_empty() && !repo.is_empty()
            );
            if !well_formed {
                return Err(ConfigError::InvalidRepository(self.repository.clone()));
            }
        }

        check_unique("release", &self.accepted_releases)?;
        check_unique("backport", &self.accepted_backports)?;

        if self.check_run_name.trim().is_empty() {
            return Err(ConfigError::Empty("checkRunName"));
        }
        if self.labels.triage.is_empty() || self.labels.stale.is_empty() {
            return Err(ConfigError::Empty("labels"));
        }

        Ok(())
    }

    /// Whether events from `repository` should be acted on.
    ///
    /// Comparison is case-insensitive, matching GitHub's handling of
    /// repository names.
    #[must_use]
    pub fn guard_allows(&self, repository: &str) -> bool {
        self.repository.is_empty() || self.repository.eq_ignore_ascii_case(repository)
    }
}

fn check_unique(kind: &'static str, values: &[String]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value.as_str()) {
            return Err(ConfigError::DuplicateValue {
                kind,
                value: value.clone(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = LabelerConfig::default();
        assert_eq!(config.stale_after_hours, 24);
        assert_eq!(config.labels.triage, "triage");
        assert_eq!(config.labels.ready_for_review, "ready for review");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_label_families() {
        let labels = LabelNames::default();
        assert_eq!(labels.release("2.1"), "release 2.1");
        assert_eq!(labels.backport("2.0"), "backport 2.0");
        assert!(labels.is_release("release 2.1"));
        assert!(!labels.is_release("released"));
        assert!(labels.is_backport("backport 2.0"));
    }

    #[test]
    fn test_load_from_path_partial_document() {
        let file = write_config(
            r#"{
                "repository": "acme/widgets",
                "acceptedReleases": ["2.1", "2.0"],
                "acceptedBackports": ["1.9"]
            }"#,
        );

        let config = LabelerConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.repository, "acme/widgets");
        assert_eq!(config.accepted_releases, vec!["2.1", "2.0"]);
        assert_eq!(config.accepted_backports, vec!["1.9"]);
        assert_eq!(config.check_run_name, "PR description labels");
    }

    #[test]
    fn test_validate_rejects_bad_guard() {
        let config = LabelerConfig {
            repository: "not-a-repo".to_string(),
            ..LabelerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRepository(_))
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = LabelerConfig {
            accepted_releases: vec!["2.1".to_string(), "2.1".to_string()],
            ..LabelerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateValue { kind: "release", .. })
        ));
    }

    #[test]
    fn test_guard() {
        let config = LabelerConfig {
            repository: "acme/widgets".to_string(),
            ..LabelerConfig::default()
        };
        assert!(config.guard_allows("acme/widgets"));
        assert!(config.guard_allows("Acme/Widgets"));
        assert!(!config.guard_allows("fork/widgets"));
        assert!(LabelerConfig::default().guard_allows("anyone/anything"));
    }

    #[test]
    fn test_update_type_ordering() {
        assert_eq!(
            UpdateType::from_metadata("version-update:semver-patch"),
            Some(UpdateType::SemverPatch)
        );
        assert_eq!(UpdateType::from_metadata("semver-major"), Some(UpdateType::SemverMajor));
        assert_eq!(UpdateType::from_metadata("security"), None);
        assert!(UpdateType::SemverPatch < UpdateType::SemverMinor);
        assert!(UpdateType::SemverMinor < UpdateType::SemverMajor);
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        let file = write_config(r#"{ "staleAfterHours": 48 }"#);

        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::set_var(ENV_LABELER_CONFIG, file.path());
        }
        let config = LabelerConfig::load().unwrap();
        unsafe {
            std::env::remove_var(ENV_LABELER_CONFIG);
        }

        assert_eq!(config.stale_after_hours, 48);
    }

    #[test]
    #[serial]
    fn test_load_from_env_missing_file() {
        // SAFETY: This test runs serially via #[serial] to avoid env var races
        unsafe {
            std::env::set_var(ENV_LABELER_CONFIG, "/nonexistent/labeler.json");
        }
        let result = LabelerConfig::load();
        unsafe {
            std::env::remove_var(ENV_LABELER_CONFIG);
        }

        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
