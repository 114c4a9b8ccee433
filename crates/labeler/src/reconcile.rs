//! # Label reconciler
//!
//! Applies planned [`LabelModification`]s to an issue or pull request.
//!
//! Adds are sent one label at a time so a 422 can be attributed: the labels
//! are re-read and, if the label is already there, the add counts as done.
//! A 403 is fatal and reported with the permission the token is missing.

use crate::rules::{LabelModification, LabelSet};
use scm::{GitHubClient, GitHubError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

const PERMISSION_HINT: &str =
    "the workflow token needs `issues: write` and `pull-requests: write` permissions";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("permission denied while {operation} ({hint}): {message}")]
    Permission {
        operation: String,
        message: String,
        hint: &'static str,
    },

    #[error("label '{0}' is not defined in the repository")]
    LabelNotDefined(String),

    #[error(transparent)]
    GitHub(#[from] GitHubError),
}

impl ReconcileError {
    #[must_use]
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission { .. })
    }
}

/// What actually changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Adds that turned out to be no-ops because the label was already set.
    pub already_present: Vec<String>,
}

impl ReconcileReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub struct LabelReconciler<'a> {
    client: &'a GitHubClient,
    dry_run: bool,
}

impl<'a> LabelReconciler<'a> {
    #[must_use]
    pub fn new(client: &'a GitHubClient, dry_run: bool) -> Self {
        Self { client, dry_run }
    }

    /// Apply `modifications` in order.
    ///
    /// # Errors
    /// Returns [`ReconcileError::Permission`] on 403,
    /// [`ReconcileError::LabelNotDefined`] when a 422 add did not land, and
    /// [`ReconcileError::GitHub`] for anything else.
    #[instrument(skip(self, modifications), fields(issue = %issue, count = modifications.len()))]
    pub async fn apply(
        &self,
        issue: u64,
        modifications: &[LabelModification],
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();

        for modification in modifications {
            if self.dry_run {
                info!(?modification, "Dry run: skipping label change on #{}", issue);
                continue;
            }

            match modification {
                LabelModification::Add(label) => {
                    if self.add(issue, label).await? {
                        report.added.push(label.clone());
                    } else {
                        report.already_present.push(label.clone());
                    }
                }
                LabelModification::Remove(label) => {
                    self.client
                        .remove_label(issue, label)
                        .await
                        .map_err(|e| {
                            permission_or(e, || format!("removing label '{label}'"))
                        })?;
                    report.removed.push(label.clone());
                }
            }
        }

        if !report.is_empty() {
            info!(
                added = ?report.added,
                removed = ?report.removed,
                "Reconciled labels on #{}", issue
            );
        }
        Ok(report)
    }

    /// Returns `true` if the label was added, `false` if it was already set.
    async fn add(&self, issue: u64, label: &str) -> Result<bool, ReconcileError> {
        match self.client.add_labels(issue, &[label.to_string()]).await {
            Ok(()) => Ok(true),
            Err(GitHubError::Unprocessable { message }) => {
                debug!(label, %message, "Add returned 422, re-checking labels");
                let current = current_labels(self.client, issue).await?;
                if current.contains(label) {
                    debug!(label, "Label already present, treating add as done");
                    Ok(false)
                } else {
                    warn!(label, "Label rejected and not present on #{}", issue);
                    Err(ReconcileError::LabelNotDefined(label.to_string()))
                }
            }
            Err(e) => Err(permission_or(e, || format!("adding label '{label}'"))),
        }
    }
}

/// Read the labels currently on `issue`.
///
/// # Errors
/// Returns [`ReconcileError::Permission`] on 403 and
/// [`ReconcileError::GitHub`] for anything else.
pub async fn current_labels(
    client: &GitHubClient,
    issue: u64,
) -> Result<LabelSet, ReconcileError> {
    let labels = client
        .get_labels(issue)
        .await
        .map_err(|e| permission_or(e, || format!("reading labels on #{issue}")))?;
    Ok(labels.into_iter().collect())
}

/// Map a 403 to [`ReconcileError::Permission`] naming `operation`.
pub(crate) fn permission_or(
    error: GitHubError,
    operation: impl FnOnce() -> String,
) -> ReconcileError {
    match error {
        GitHubError::PermissionDenied { message } => ReconcileError::Permission {
            operation: operation(),
            message,
            hint: PERMISSION_HINT,
        },
        other => ReconcileError::GitHub(other),
    }
}
