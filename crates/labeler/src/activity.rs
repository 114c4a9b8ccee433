//! # Pull request activity aggregation
//!
//! The last activity on a PR is the newest timestamp across its detail
//! record, commits, conversation comments, review comments, reviews and
//! label changes. Sources are read one after another; a failing source is
//! logged and skipped. If every secondary source fails the PR creation time
//! is used.

use chrono::{DateTime, Utc};
use scm::{GitHubClient, GitHubError, PullRequest};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySource {
    /// The PR record itself (`updated_at`)
    Detail,
    Commits,
    IssueComments,
    ReviewComments,
    Reviews,
    /// `labeled`/`unlabeled` timeline events
    LabelEvents,
}

impl ActivitySource {
    /// Sources queried in addition to the PR detail.
    pub const SECONDARY: [Self; 5] = [
        Self::Commits,
        Self::IssueComments,
        Self::ReviewComments,
        Self::Reviews,
        Self::LabelEvents,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Detail => "detail",
            Self::Commits => "commits",
            Self::IssueComments => "issue_comments",
            Self::ReviewComments => "review_comments",
            Self::Reviews => "reviews",
            Self::LabelEvents => "label_events",
        }
    }
}

impl fmt::Display for ActivitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of querying one source. `Ok(None)` means the source was read
/// but had no timestamps.
#[derive(Debug, Clone)]
pub struct SourceResult {
    pub source: ActivitySource,
    pub outcome: Result<Option<DateTime<Utc>>, String>,
}

impl SourceResult {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct ActivityReport {
    pub pr_number: u64,
    pub last_activity: DateTime<Utc>,
    pub sources: Vec<SourceResult>,
}

impl ActivityReport {
    /// Whether the result fell back to the PR creation time.
    #[must_use]
    pub fn used_creation_time(&self) -> bool {
        self.sources
            .iter()
            .filter(|s| ActivitySource::SECONDARY.contains(&s.source))
            .all(|s| !s.succeeded())
    }
}

/// Reduce per-source results to the last activity time.
#[must_use]
pub fn reduce(created_at: DateTime<Utc>, results: &[SourceResult]) -> DateTime<Utc> {
    let any_secondary = results
        .iter()
        .any(|r| ActivitySource::SECONDARY.contains(&r.source) && r.succeeded());
    if !any_secondary {
        return created_at;
    }

    results
        .iter()
        .filter_map(|r| r.outcome.as_ref().ok().copied().flatten())
        .fold(created_at, std::cmp::max)
}

pub struct ActivityAggregator<'a> {
    client: &'a GitHubClient,
}

impl<'a> ActivityAggregator<'a> {
    #[must_use]
    pub fn new(client: &'a GitHubClient) -> Self {
        Self { client }
    }

    /// Compute the last activity time for `pr`.
    pub async fn last_activity(&self, pr: &PullRequest) -> ActivityReport {
        let number = pr.number;
        let mut sources = Vec::with_capacity(6);

        sources.push(Self::record(
            ActivitySource::Detail,
            self.client.get_pull(number).await.map(|p| Some(p.updated_at)),
        ));
        sources.push(Self::record(
            ActivitySource::Commits,
            self.client
                .list_commits(number)
                .await
                .map(|c| c.iter().filter_map(scm::Commit::timestamp).max()),
        ));
        sources.push(Self::record(
            ActivitySource::IssueComments,
            self.client
                .list_comments(number)
                .await
                .map(|c| c.iter().map(|c| c.updated_at).max()),
        ));
        sources.push(Self::record(
            ActivitySource::ReviewComments,
            self.client
                .list_review_comments(number)
                .await
                .map(|c| c.iter().map(|c| c.updated_at).max()),
        ));
        sources.push(Self::record(
            ActivitySource::Reviews,
            self.client
                .list_reviews(number)
                .await
                .map(|r| r.iter().filter_map(|r| r.submitted_at).max()),
        ));
        sources.push(Self::record(
            ActivitySource::LabelEvents,
            self.client.list_timeline(number).await.map(|events| {
                events
                    .iter()
                    .filter(|e| e.is_label_change())
                    .filter_map(|e| e.created_at)
                    .max()
            }),
        ));

        let last_activity = reduce(pr.created_at, &sources);
        let report = ActivityReport {
            pr_number: number,
            last_activity,
            sources,
        };

        if report.used_creation_time() {
            warn!(pr = number, "All activity sources failed, using creation time");
        }
        debug!(pr = number, last_activity = %report.last_activity, "Computed last activity");
        report
    }

    fn record(
        source: ActivitySource,
        result: Result<Option<DateTime<Utc>>, GitHubError>,
    ) -> SourceResult {
        let outcome = result.map_err(|e| {
            warn!(source = %source, error = %e, "Activity source failed");
            e.to_string()
        });
        SourceResult { source, outcome }
    }
}
