//! Scheduled stale sweep over open pull requests.

use crate::activity::ActivityAggregator;
use crate::reconcile::{permission_or, LabelReconciler, ReconcileError};
use crate::rules::LabelModification;
use chrono::{DateTime, Duration, Utc};
use config::LabelNames;
use scm::GitHubClient;
use tracing::{debug, info, warn};

/// Counts from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub skipped_draft: usize,
    pub skipped_labeled: usize,
    pub active: usize,
    /// PRs labeled stale in this sweep (or that would be, in a dry run).
    pub marked: Vec<u64>,
    pub failed: Vec<(u64, String)>,
}

/// Whether `last_activity` is older than `threshold` at `now`.
#[must_use]
pub fn is_stale(last_activity: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> bool {
    now.signed_duration_since(last_activity) > threshold
}

pub struct StaleSweeper<'a> {
    client: &'a GitHubClient,
    names: &'a LabelNames,
    threshold: Duration,
    dry_run: bool,
}

impl<'a> StaleSweeper<'a> {
    #[must_use]
    pub fn new(
        client: &'a GitHubClient,
        names: &'a LabelNames,
        stale_after_hours: u64,
        dry_run: bool,
    ) -> Self {
        let threshold = i64::try_from(stale_after_hours)
            .ok()
            .and_then(Duration::try_hours)
            .unwrap_or(Duration::MAX);
        Self {
            client,
            names,
            threshold,
            dry_run,
        }
    }

    /// Label every open, non-draft PR inactive for longer than the threshold.
    ///
    /// # Errors
    /// Returns an error if the open PRs cannot be listed or the token lacks
    /// permission to label. Other per-PR failures are recorded in the report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, ReconcileError> {
        let pulls = self
            .client
            .list_open_pulls()
            .await
            .map_err(|e| permission_or(e, || "listing open pull requests".to_string()))?;
        let aggregator = ActivityAggregator::new(self.client);
        let reconciler = LabelReconciler::new(self.client, self.dry_run);
        let mut report = SweepReport::default();

        info!(count = pulls.len(), "Starting stale sweep");

        for pr in &pulls {
            report.examined += 1;

            if pr.draft {
                debug!(pr = pr.number, "Skipping draft");
                report.skipped_draft += 1;
                continue;
            }
            if pr.labels.iter().any(|l| l.name == self.names.stale) {
                debug!(pr = pr.number, "Already stale");
                report.skipped_labeled += 1;
                continue;
            }

            let activity = aggregator.last_activity(pr).await;
            if !is_stale(activity.last_activity, now, self.threshold) {
                report.active += 1;
                continue;
            }

            info!(
                pr = pr.number,
                last_activity = %activity.last_activity,
                "Marking PR as stale"
            );
            let modification = [LabelModification::Add(self.names.stale.clone())];
            match reconciler.apply(pr.number, &modification).await {
                Ok(_) => report.marked.push(pr.number),
                Err(e) if e.is_permission() => return Err(e),
                Err(e) => {
                    warn!(pr = pr.number, error = %e, "Failed to mark PR as stale");
                    report.failed.push((pr.number, e.to_string()));
                }
            }
        }

        info!(
            examined = report.examined,
            marked = report.marked.len(),
            failed = report.failed.len(),
            "Stale sweep finished"
        );
        Ok(report)
    }
}
