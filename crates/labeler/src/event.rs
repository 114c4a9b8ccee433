//! # Event collection
//!
//! Normalizes the webhook payload GitHub hands to a workflow run into an
//! [`EventRecord`], and persists the record plus the parsed description
//! block so a dependent, privileged run can act on them.

use crate::description::{self, DescriptionBlock};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

/// File holding the serialized [`EventRecord`].
pub const METADATA_FILE: &str = "metadata.json";
/// File holding the serialized [`DescriptionBlock`].
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Error)]
pub enum EventError {
    #[error("unsupported event '{0}'")]
    Unsupported(String),

    #[error("event payload is missing {0}")]
    MissingField(&'static str),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(
        "artifact captured at {captured_at} is older than the {retention_days}-day retention window"
    )]
    Expired {
        captured_at: DateTime<Utc>,
        retention_days: u64,
    },
}

/// GitHub event name (`GITHUB_EVENT_NAME`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Issues,
    PullRequest,
    PullRequestTarget,
    Schedule,
    WorkflowRun,
    WorkflowDispatch,
}

impl EventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Issues => "issues",
            Self::PullRequest => "pull_request",
            Self::PullRequestTarget => "pull_request_target",
            Self::Schedule => "schedule",
            Self::WorkflowRun => "workflow_run",
            Self::WorkflowDispatch => "workflow_dispatch",
        }
    }

    #[must_use]
    pub const fn is_pull_request(&self) -> bool {
        matches!(self, Self::PullRequest | Self::PullRequestTarget)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issues" => Ok(Self::Issues),
            "pull_request" => Ok(Self::PullRequest),
            "pull_request_target" => Ok(Self::PullRequestTarget),
            "schedule" => Ok(Self::Schedule),
            "workflow_run" => Ok(Self::WorkflowRun),
            "workflow_dispatch" => Ok(Self::WorkflowDispatch),
            other => Err(EventError::Unsupported(other.to_string())),
        }
    }
}

/// Pull request fields captured from the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrFields {
    pub draft: bool,
    pub body: Option<String>,
    pub head_sha: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Normalized event metadata. Immutable once captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: EventKind,
    pub issue_number: Option<u64>,
    pub repository: String,
    pub action: Option<String>,
    pub label: Option<String>,
    pub pr: Option<PrFields>,
    pub captured_at: DateTime<Utc>,
}

// Payload shapes: only what the record needs.

#[derive(Debug, Deserialize)]
struct Payload {
    action: Option<String>,
    repository: Option<RepositoryPayload>,
    issue: Option<NumberPayload>,
    pull_request: Option<PullRequestPayload>,
    label: Option<LabelPayload>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct NumberPayload {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct LabelPayload {
    name: String,
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    login: String,
}

#[derive(Debug, Deserialize)]
struct HeadPayload {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    number: u64,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    body: Option<String>,
    head: HeadPayload,
    #[serde(default)]
    user: Option<UserPayload>,
    created_at: DateTime<Utc>,
}

impl EventRecord {
    /// Build a record from an event name and its JSON payload.
    ///
    /// `fallback_repository` is used when the payload carries no repository
    /// (schedule events).
    ///
    /// # Errors
    /// Returns an error for unknown event names, malformed JSON, or a
    /// missing repository.
    pub fn from_payload(
        event_name: &str,
        payload: &str,
        fallback_repository: Option<&str>,
    ) -> Result<Self, EventError> {
        let event_type = EventKind::from_str(event_name)?;
        let payload: Payload = serde_json::from_str(payload)?;

        let repository = payload
            .repository
            .map(|r| r.full_name)
            .or_else(|| fallback_repository.map(str::to_string))
            .ok_or(EventError::MissingField("repository"))?;

        let pr = payload.pull_request.as_ref().map(|pr| PrFields {
            draft: pr.draft,
            body: pr.body.clone(),
            head_sha: pr.head.sha.clone(),
            author: pr.user.as_ref().map(|u| u.login.clone()),
            created_at: pr.created_at,
        });

        let issue_number = payload
            .pull_request
            .as_ref()
            .map(|pr| pr.number)
            .or_else(|| payload.issue.as_ref().map(|i| i.number));

        let record = Self {
            event_type,
            issue_number,
            repository,
            action: payload.action,
            label: payload.label.map(|l| l.name),
            pr,
            captured_at: Utc::now(),
        };
        debug!(
            event = %record.event_type,
            action = ?record.action,
            issue = ?record.issue_number,
            "Captured event"
        );
        Ok(record)
    }

    /// Read `GITHUB_EVENT_PATH`-style payload from disk.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(
        event_name: &str,
        path: &Path,
        fallback_repository: Option<&str>,
    ) -> Result<Self, EventError> {
        let payload = std::fs::read_to_string(path).map_err(|source| EventError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_payload(event_name, &payload, fallback_repository)
    }

    /// Issue or PR number, required for label events.
    ///
    /// # Errors
    /// Returns [`EventError::MissingField`] when the event has no number.
    pub fn require_number(&self) -> Result<u64, EventError> {
        self.issue_number.ok_or(EventError::MissingField("issue number"))
    }

    /// PR fields, required for description handling.
    ///
    /// # Errors
    /// Returns [`EventError::MissingField`] for non-PR events.
    pub fn require_pr(&self) -> Result<&PrFields, EventError> {
        self.pr.as_ref().ok_or(EventError::MissingField("pull_request"))
    }
}

/// The blobs handed from the collecting run to the applying run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub record: EventRecord,
    pub block: DescriptionBlock,
}

impl Artifacts {
    /// Capture artifacts for a record, parsing the PR description if any.
    #[must_use]
    pub fn capture(record: EventRecord) -> Self {
        let block = record
            .pr
            .as_ref()
            .and_then(|pr| pr.body.as_deref())
            .map(description::parse)
            .unwrap_or_default();
        Self { record, block }
    }

    /// Write both blobs into `dir`, creating it if needed.
    ///
    /// # Errors
    /// Returns an error if the directory or files cannot be written.
    pub fn save(&self, dir: &Path) -> Result<(), EventError> {
        std::fs::create_dir_all(dir).map_err(|source| EventError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        write_json(&dir.join(METADATA_FILE), &self.record)?;
        write_json(&dir.join(CONFIG_FILE), &self.block)?;

        info!(dir = %dir.display(), "Saved event artifacts");
        Ok(())
    }

    /// Read both blobs from `dir`, rejecting artifacts older than the
    /// retention window.
    ///
    /// # Errors
    /// Returns an error if a file is missing or malformed, or if the record
    /// has expired.
    pub fn load(dir: &Path, retention_days: u64, now: DateTime<Utc>) -> Result<Self, EventError> {
        let record: EventRecord = read_json(&dir.join(METADATA_FILE))?;
        let block: DescriptionBlock = read_json(&dir.join(CONFIG_FILE))?;

        let retention = i64::try_from(retention_days)
            .ok()
            .and_then(Duration::try_days)
            .unwrap_or(Duration::MAX);
        if now.signed_duration_since(record.captured_at) > retention {
            return Err(EventError::Expired {
                captured_at: record.captured_at,
                retention_days,
            });
        }

        Ok(Self { record, block })
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EventError> {
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(path, content).map_err(|source| EventError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EventError> {
    let content = std::fs::read_to_string(path).map_err(|source| EventError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}
