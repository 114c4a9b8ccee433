//! Error types for GitHub API calls.

use std::time::Duration;
use thiserror::Error;

/// Errors returned by [`crate::GitHubClient`].
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// 403 without rate-limit exhaustion: the token lacks a permission.
    #[error("permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("rate limit exceeded, reset in {reset_in:?}")]
    RateLimitExceeded { reset_in: Duration },

    #[error("not found: {message}")]
    NotFound { message: String },

    /// 422: validation failed, e.g. a label that already exists or is unknown.
    #[error("unprocessable entity: {message}")]
    Unprocessable { message: String },

    #[error("GitHub API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("invalid repository '{0}', expected owner/repo")]
    InvalidRepository(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl GitHubError {
    /// HTTP status associated with this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed(_) => Some(401),
            Self::PermissionDenied { .. } | Self::RateLimitExceeded { .. } => Some(403),
            Self::NotFound { .. } => Some(404),
            Self::Unprocessable { .. } => Some(422),
            Self::Api { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
