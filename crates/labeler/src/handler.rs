//! Event handling: turns an [`EventRecord`] into label changes and
//! validation notifications.

use crate::dependabot::{AutoMerger, Decision, DependabotError};
use crate::description::{self, Validation};
use crate::event::{Artifacts, EventError, EventKind, EventRecord};
use crate::reconcile::{self, LabelReconciler, ReconcileError, ReconcileReport};
use crate::rules::{LabelModification, RuleEngine, Trigger};
use crate::stale::{StaleSweeper, SweepReport};
use chrono::{DateTime, Utc};
use config::LabelerConfig;
use notify::{Notifier, NotifyEvent};
use scm::GitHubClient;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// PR actions that (re)read the description block.
const DESCRIPTION_ACTIONS: &[&str] = &[
    "opened",
    "reopened",
    "edited",
    "synchronize",
    "ready_for_review",
];

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Result of applying a description block.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub validation: Validation,
    pub report: ReconcileReport,
}

/// Map an event to the rule triggers it fires.
#[must_use]
pub fn triggers_for(record: &EventRecord) -> Vec<Trigger> {
    let action = record.action.as_deref().unwrap_or_default();

    match record.event_type {
        EventKind::Issues => match (action, record.label.as_deref()) {
            ("opened", _) => vec![Trigger::IssueOpened],
            ("labeled", Some(label)) => vec![Trigger::LabelAdded(label.to_string())],
            ("unlabeled", Some(label)) => vec![Trigger::LabelRemoved(label.to_string())],
            _ => Vec::new(),
        },
        EventKind::PullRequest | EventKind::PullRequestTarget => {
            let draft = record.pr.as_ref().is_some_and(|pr| pr.draft);
            let state = Trigger::PullRequestState { draft };
            match (action, record.label.as_deref()) {
                ("opened" | "ready_for_review", _) => vec![state],
                ("reopened" | "synchronize" | "edited", _) => vec![Trigger::Activity, state],
                ("labeled", Some(label)) => vec![Trigger::LabelAdded(label.to_string()), state],
                ("unlabeled", Some(label)) => vec![Trigger::LabelRemoved(label.to_string())],
                _ => Vec::new(),
            }
        }
        EventKind::Schedule | EventKind::WorkflowRun | EventKind::WorkflowDispatch => Vec::new(),
    }
}

/// Whether `record` is a PR event whose description should be applied.
#[must_use]
pub fn reads_description(record: &EventRecord) -> bool {
    record.event_type.is_pull_request()
        && record.pr.is_some()
        && record
            .action
            .as_deref()
            .is_some_and(|a| DESCRIPTION_ACTIONS.contains(&a))
}

/// Runs the label workflows for one repository.
pub struct Labeler {
    client: GitHubClient,
    config: LabelerConfig,
    notifier: Notifier,
    dry_run: bool,
}

impl Labeler {
    #[must_use]
    pub fn new(
        client: GitHubClient,
        config: LabelerConfig,
        notifier: Notifier,
        dry_run: bool,
    ) -> Self {
        Self {
            client,
            config,
            notifier,
            dry_run,
        }
    }

    #[must_use]
    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }

    /// Handle an event delivered directly to a privileged run.
    ///
    /// PR events that carry a description go through
    /// [`Labeler::apply_description`]; everything else is evaluated against
    /// the rule table only.
    ///
    /// # Errors
    /// Returns an error if the event lacks an issue number or a label change
    /// fails.
    #[instrument(skip(self, record), fields(event = %record.event_type, action = ?record.action))]
    pub async fn handle_event(&self, record: EventRecord) -> Result<ReconcileReport, HandlerError> {
        if reads_description(&record) {
            let outcome = self.apply_description(&Artifacts::capture(record)).await?;
            return Ok(outcome.report);
        }

        let triggers = triggers_for(&record);
        if triggers.is_empty() {
            debug!("Event fires no label rules");
            return Ok(ReconcileReport::default());
        }

        let number = record.require_number()?;
        let labels = reconcile::current_labels(&self.client, number).await?;
        let modifications = RuleEngine::new(&self.config.labels).plan(&triggers, &labels);

        Ok(LabelReconciler::new(&self.client, self.dry_run)
            .apply(number, &modifications)
            .await?)
    }

    /// Validate the description block, reconcile labels and report the
    /// outcome through the notifier.
    ///
    /// An invalid value adds no labels: the PR rule table is only evaluated
    /// when every key validated. The completion notification is sent even if
    /// reconciliation fails.
    ///
    /// # Errors
    /// Returns an error if the artifacts are not for a PR or a label change
    /// fails.
    #[instrument(skip(self, artifacts), fields(issue = ?artifacts.record.issue_number))]
    pub async fn apply_description(
        &self,
        artifacts: &Artifacts,
    ) -> Result<ApplyOutcome, HandlerError> {
        let record = &artifacts.record;
        let number = record.require_number()?;
        let pr = record.require_pr()?;

        self.notifier
            .notify(&NotifyEvent::ValidationStarted {
                issue_number: number,
                head_sha: pr.head_sha.clone(),
                timestamp: Utc::now(),
            })
            .await;

        let validation = description::validate(&artifacts.block, &self.config);
        let result = self.reconcile_description(record, &validation, pr.draft).await;

        self.notifier
            .notify(&NotifyEvent::ValidationCompleted {
                issue_number: number,
                head_sha: pr.head_sha.clone(),
                failures: validation.failures.clone(),
                timestamp: Utc::now(),
            })
            .await;

        let report = result?;
        info!(
            valid = validation.is_valid(),
            failures = validation.failures.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            "Applied description"
        );
        Ok(ApplyOutcome { validation, report })
    }

    async fn reconcile_description(
        &self,
        record: &EventRecord,
        validation: &Validation,
        draft: bool,
    ) -> Result<ReconcileReport, HandlerError> {
        let number = record.require_number()?;
        let engine = RuleEngine::new(&self.config.labels);
        let labels = reconcile::current_labels(&self.client, number).await?;

        let triggers: Vec<Trigger> = triggers_for(record)
            .into_iter()
            .filter(|t| !matches!(t, Trigger::PullRequestState { .. }))
            .collect();
        let mut modifications = engine.plan(&triggers, &labels);
        let mut state = labels.apply(&modifications);

        let requested = engine.description(&state, &validation.config);
        state = state.apply(&requested);
        let added: Vec<Trigger> = requested
            .iter()
            .filter_map(|m| match m {
                LabelModification::Add(l) => Some(Trigger::LabelAdded(l.clone())),
                LabelModification::Remove(_) => None,
            })
            .collect();
        modifications.extend(requested);

        let follow_up = engine.plan(&added, &state);
        state = state.apply(&follow_up);
        modifications.extend(follow_up);

        if validation.is_valid() {
            modifications.extend(engine.pull_request_state(&state, draft));
        } else {
            debug!("Description has invalid values, skipping PR state rules");
        }

        Ok(LabelReconciler::new(&self.client, self.dry_run)
            .apply(number, &modifications)
            .await?)
    }

    /// Run the stale sweep.
    ///
    /// # Errors
    /// See [`StaleSweeper::sweep`].
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> Result<SweepReport, ReconcileError> {
        StaleSweeper::new(
            &self.client,
            &self.config.labels,
            self.config.stale_after_hours,
            self.dry_run,
        )
        .sweep(now)
        .await
    }

    /// Run Dependabot auto-merge for one PR.
    ///
    /// # Errors
    /// See [`AutoMerger::handle`].
    pub async fn auto_merge(&self, number: u64) -> Result<Decision, DependabotError> {
        AutoMerger::new(&self.client, &self.config.dependabot, self.dry_run)
            .handle(number)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::PrFields;

    fn record(
        kind: EventKind,
        action: &str,
        label: Option<&str>,
        pr: Option<PrFields>,
    ) -> EventRecord {
        EventRecord {
            event_type: kind,
            issue_number: Some(1),
            repository: "acme/widgets".to_string(),
            action: Some(action.to_string()),
            label: label.map(str::to_string),
            pr,
            captured_at: Utc::now(),
        }
    }

    fn pr_fields(draft: bool) -> PrFields {
        PrFields {
            draft,
            body: None,
            head_sha: "abc".to_string(),
            author: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_issue_triggers() {
        assert_eq!(
            triggers_for(&record(EventKind::Issues, "opened", None, None)),
            vec![Trigger::IssueOpened]
        );
        assert_eq!(
            triggers_for(&record(EventKind::Issues, "unlabeled", Some("triage"), None)),
            vec![Trigger::LabelRemoved("triage".to_string())]
        );
        assert!(triggers_for(&record(EventKind::Issues, "closed", None, None)).is_empty());
    }

    #[test]
    fn test_pull_request_triggers() {
        let synced = record(
            EventKind::PullRequestTarget,
            "synchronize",
            None,
            Some(pr_fields(true)),
        );
        assert_eq!(
            triggers_for(&synced),
            vec![Trigger::Activity, Trigger::PullRequestState { draft: true }]
        );

        let labeled = record(
            EventKind::PullRequest,
            "labeled",
            Some("release 2.1"),
            Some(pr_fields(false)),
        );
        assert_eq!(
            triggers_for(&labeled),
            vec![
                Trigger::LabelAdded("release 2.1".to_string()),
                Trigger::PullRequestState { draft: false }
            ]
        );
    }

    #[test]
    fn test_reads_description() {
        let edited = record(EventKind::PullRequest, "edited", None, Some(pr_fields(false)));
        assert!(reads_description(&edited));

        let labeled = record(
            EventKind::PullRequest,
            "labeled",
            Some("bug"),
            Some(pr_fields(false)),
        );
        assert!(!reads_description(&labeled));
        assert!(!reads_description(&record(EventKind::Issues, "opened", None, None)));
    }
}
