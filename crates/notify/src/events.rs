//! Validation outcome events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of description value a validation failure belongs to.
///
/// Each class owns at most one open error comment on a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    Release,
    Backport,
    NeedsFeatureBranch,
}

impl FailureClass {
    pub const ALL: [Self; 3] = [Self::Release, Self::Backport, Self::NeedsFeatureBranch];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Backport => "backport",
            Self::NeedsFeatureBranch => "needs_feature_branch",
        }
    }

    /// Hidden HTML marker identifying comments posted for this class.
    #[must_use]
    pub fn marker(&self) -> String {
        format!("<!-- labeler:{} -->", self.as_str())
    }
}

/// One invalid value found in a pull request description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFailure {
    pub class: FailureClass,
    pub message: String,
}

impl ValidationFailure {
    /// Comment body for this failure, carrying the class marker.
    #[must_use]
    pub fn comment_body(&self) -> String {
        format!(
            "{}\n:warning: **Invalid `{}` value in the PR description**\n\n{}\n\n\
             Edit the description to fix the value; this comment is replaced on the next run.",
            self.class.marker(),
            self.class.as_str(),
            self.message
        )
    }
}

/// Events emitted while validating a pull request description.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// Validation of the description block has begun
    ValidationStarted {
        issue_number: u64,
        head_sha: String,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// Validation finished; `failures` is empty on success
    ValidationCompleted {
        issue_number: u64,
        head_sha: String,
        failures: Vec<ValidationFailure>,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Get a short title for this event type.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::ValidationStarted { issue_number, .. } => {
                format!("Validating description of #{issue_number}")
            }
            Self::ValidationCompleted {
                issue_number,
                failures,
                ..
            } => {
                if failures.is_empty() {
                    format!("Description of #{issue_number} is valid")
                } else {
                    format!(
                        "Description of #{issue_number} has {} invalid value(s)",
                        failures.len()
                    )
                }
            }
        }
    }

    #[must_use]
    pub fn issue_number(&self) -> u64 {
        match self {
            Self::ValidationStarted { issue_number, .. }
            | Self::ValidationCompleted { issue_number, .. } => *issue_number,
        }
    }

    #[must_use]
    pub fn head_sha(&self) -> &str {
        match self {
            Self::ValidationStarted { head_sha, .. }
            | Self::ValidationCompleted { head_sha, .. } => head_sha,
        }
    }

    /// Get the timestamp for this event.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::ValidationStarted { timestamp, .. }
            | Self::ValidationCompleted { timestamp, .. } => *timestamp,
        }
    }

    /// Failures for `class`, if this is a completion event.
    #[must_use]
    pub fn failures_for(&self, class: FailureClass) -> Vec<&ValidationFailure> {
        match self {
            Self::ValidationStarted { .. } => Vec::new(),
            Self::ValidationCompleted { failures, .. } => {
                failures.iter().filter(|f| f.class == class).collect()
            }
        }
    }
}
