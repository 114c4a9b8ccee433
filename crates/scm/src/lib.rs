//! GitHub access for the repository labeler.
//!
//! [`GitHubClient`] wraps the REST endpoints for labels, comments, check
//! runs and pull request activity, plus the single GraphQL mutation used to
//! enable auto-merge.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{GitHubClient, GITHUB_API_URL};
pub use error::GitHubError;
pub use types::{
    CheckConclusion, CheckOutput, CheckRun, CheckStatus, Commit, IssueComment, Label,
    PullRequest, Review, ReviewComment, TimelineEvent, User,
};
