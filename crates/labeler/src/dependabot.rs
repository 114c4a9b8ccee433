//! # Dependabot auto-merge
//!
//! Dependabot writes YAML front matter into its commit messages:
//!
//! ```text
//! Bump serde from 1.0.196 to 1.0.197
//!
//! ---
//! updated-dependencies:
//! - dependency-name: serde
//!   dependency-type: direct:production
//!   update-type: version-update:semver-patch
//! ...
//! ```
//!
//! When every listed update is within the configured maximum update type
//! the PR is approved and auto-merge is enabled.

use config::{DependabotConfig, UpdateType};
use scm::{GitHubClient, GitHubError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Debug, Error)]
pub enum DependabotError {
    #[error("commit message has no dependabot metadata block")]
    MissingMetadata,

    #[error("invalid dependabot metadata: {0}")]
    InvalidMetadata(#[from] serde_yaml::Error),

    #[error("pull request #{0} has no commits")]
    NoCommits(u64),

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdatedDependency {
    pub dependency_name: String,
    #[serde(default)]
    pub dependency_type: Option<String>,
    #[serde(default)]
    pub update_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct Metadata {
    #[serde(default)]
    updated_dependencies: Vec<UpdatedDependency>,
}

/// What to do with a Dependabot pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Merge,
    Skip(String),
}

/// Extract the dependency list from a Dependabot commit message.
///
/// # Errors
/// Returns [`DependabotError::MissingMetadata`] if no `---` block is present
/// or it lists no dependencies, and [`DependabotError::InvalidMetadata`] if
/// the block is not valid YAML.
pub fn parse_commit_metadata(message: &str) -> Result<Vec<UpdatedDependency>, DependabotError> {
    let mut lines = message.lines().skip_while(|l| l.trim_end() != "---");
    if lines.next().is_none() {
        return Err(DependabotError::MissingMetadata);
    }

    let yaml: Vec<&str> = lines
        .take_while(|l| {
            let trimmed = l.trim_end();
            trimmed != "..." && trimmed != "---"
        })
        .collect();

    let metadata: Metadata = serde_yaml::from_str(&yaml.join("\n"))?;
    if metadata.updated_dependencies.is_empty() {
        return Err(DependabotError::MissingMetadata);
    }
    Ok(metadata.updated_dependencies)
}

/// Decide whether `dependencies` may be merged under `max`.
#[must_use]
pub fn decide(dependencies: &[UpdatedDependency], max: UpdateType) -> Decision {
    for dependency in dependencies {
        let Some(raw) = dependency.update_type.as_deref() else {
            return Decision::Skip(format!(
                "{} has no update type",
                dependency.dependency_name
            ));
        };
        match UpdateType::from_metadata(raw) {
            Some(update) if update <= max => {}
            Some(_) => {
                return Decision::Skip(format!(
                    "{} is a {raw} update, above the allowed maximum",
                    dependency.dependency_name
                ))
            }
            None => {
                return Decision::Skip(format!(
                    "{} has unrecognized update type {raw}",
                    dependency.dependency_name
                ))
            }
        }
    }
    Decision::Merge
}

pub struct AutoMerger<'a> {
    client: &'a GitHubClient,
    config: &'a DependabotConfig,
    dry_run: bool,
}

impl<'a> AutoMerger<'a> {
    #[must_use]
    pub fn new(client: &'a GitHubClient, config: &'a DependabotConfig, dry_run: bool) -> Self {
        Self {
            client,
            config,
            dry_run,
        }
    }

    /// Approve and enable auto-merge on `number` if policy allows.
    ///
    /// # Errors
    /// Returns an error if the PR or its commits cannot be read, the
    /// metadata is malformed, or approval/auto-merge fails.
    #[instrument(skip(self), fields(pr = %number))]
    pub async fn handle(&self, number: u64) -> Result<Decision, DependabotError> {
        if !self.config.enabled {
            return Ok(Decision::Skip("auto-merge disabled".to_string()));
        }

        let pr = self.client.get_pull(number).await?;
        if pr.author() != Some(self.config.author.as_str()) {
            debug!(author = ?pr.author(), "Not a dependabot PR");
            return Ok(Decision::Skip("not a dependabot pull request".to_string()));
        }

        let commits = self.client.list_commits(number).await?;
        let first = commits.first().ok_or(DependabotError::NoCommits(number))?;
        let dependencies = parse_commit_metadata(&first.commit.message)?;

        let decision = decide(&dependencies, self.config.max_update_type);
        match &decision {
            Decision::Skip(reason) => info!(%reason, "Leaving PR for manual review"),
            Decision::Merge if self.dry_run => {
                info!(count = dependencies.len(), "Dry run: would approve and auto-merge");
            }
            Decision::Merge => {
                self.client
                    .approve_pull(number, "Automatically approved: update within policy.")
                    .await?;
                self.client
                    .enable_auto_merge(&pr.node_id, self.config.merge_method.as_graphql())
                    .await?;
            }
        }

        Ok(decision)
    }
}
