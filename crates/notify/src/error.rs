//! Error types for the notification system.

use thiserror::Error;

/// Errors that can occur when delivering a notification.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// GitHub API call failed
    #[error("GitHub request failed: {0}")]
    GitHub(#[from] scm::GitHubError),

    /// Other error
    #[error("{0}")]
    Other(String),
}
