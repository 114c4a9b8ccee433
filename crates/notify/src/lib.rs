//! Validation outcome notifications.
//!
//! This crate reports the result of validating a pull request description
//! back to GitHub: a check run on the head commit and one marker-identified
//! error comment per failure class.
//!
//! # Usage
//!
//! ```no_run
//! use notify::{Notifier, NotifyEvent};
//!
//! # async fn example(client: scm::GitHubClient) {
//! let notifier = Notifier::for_github(client, "PR description labels");
//!
//! notifier
//!     .notify(&NotifyEvent::ValidationStarted {
//!         issue_number: 42,
//!         head_sha: "abc123".to_string(),
//!         timestamp: chrono::Utc::now(),
//!     })
//!     .await;
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`NotifyChannel`] trait defines the interface for notification channels
//! - [`CheckRunChannel`] creates and completes the check run
//! - [`CommentChannel`] replaces per-class error comments
//! - [`LogChannel`] logs events without touching GitHub (dry runs)
//! - [`Notifier`] dispatches events to every enabled channel, in order
//!
//! Delivery is best-effort: a channel failure is logged and never aborts the
//! caller's primary action.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod error;
pub mod events;

pub use channels::check_run::CheckRunChannel;
pub use channels::comment::CommentChannel;
pub use channels::log::LogChannel;
pub use channels::NotifyChannel;
pub use error::ChannelError;
pub use events::{FailureClass, NotifyEvent, ValidationFailure};

use std::sync::Arc;
use tracing::{debug, error, info};

/// Central notification dispatcher.
///
/// Channels are invoked sequentially in registration order so that a check
/// run is created before comments are touched.
pub struct Notifier {
    channels: Vec<Arc<dyn NotifyChannel>>,
    disabled: bool,
}

impl Notifier {
    /// Create a notifier that reports through the check run and comment
    /// channels.
    #[must_use]
    pub fn for_github(client: scm::GitHubClient, check_run_name: &str) -> Self {
        let channels: Vec<Arc<dyn NotifyChannel>> = vec![
            Arc::new(CheckRunChannel::new(client.clone(), check_run_name)),
            Arc::new(CommentChannel::new(client)),
        ];
        info!(channel_count = channels.len(), "Notification system initialized");
        Self::with_channels(channels)
    }

    /// Create a notifier that only logs.
    #[must_use]
    pub fn logging_only() -> Self {
        Self::with_channels(vec![Arc::new(LogChannel)])
    }

    /// Create a notifier with specific channels.
    #[must_use]
    pub fn with_channels(channels: Vec<Arc<dyn NotifyChannel>>) -> Self {
        Self {
            channels,
            disabled: false,
        }
    }

    /// Create a disabled notifier (for testing or when notifications are off).
    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            channels: vec![],
            disabled: true,
        }
    }

    /// Send an event to every enabled channel. Errors are logged, not
    /// propagated.
    pub async fn notify(&self, event: &NotifyEvent) {
        for (channel_name, result) in self.notify_and_collect(event).await {
            match result {
                Ok(()) => debug!(channel = channel_name, "Notification sent"),
                Err(e) => error!(
                    channel = channel_name,
                    error = %e,
                    "Failed to send notification"
                ),
            }
        }
    }

    /// Send an event to every enabled channel and return each channel's
    /// result.
    pub async fn notify_and_collect(
        &self,
        event: &NotifyEvent,
    ) -> Vec<(String, Result<(), ChannelError>)> {
        if self.disabled || self.channels.is_empty() {
            debug!("No channels configured, skipping event");
            return vec![];
        }

        let mut results = vec![];

        for channel in &self.channels {
            if !channel.enabled() {
                debug!(channel = channel.name(), "Channel disabled, skipping");
                continue;
            }
            let result = channel.send(event).await;
            results.push((channel.name().to_string(), result));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::MockNotifyChannel;

    fn completed() -> NotifyEvent {
        NotifyEvent::ValidationCompleted {
            issue_number: 42,
            head_sha: "abc".to_string(),
            failures: vec![ValidationFailure {
                class: FailureClass::Release,
                message: "bad".to_string(),
            }],
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_disabled_notifier_sends_nothing() {
        let notifier = Notifier::disabled();
        assert!(notifier.notify_and_collect(&completed()).await.is_empty());
    }

    #[test]
    fn test_markers_are_distinct() {
        let markers: std::collections::HashSet<String> =
            FailureClass::ALL.iter().map(FailureClass::marker).collect();
        assert_eq!(markers.len(), 3);
        assert_eq!(FailureClass::Release.marker(), "<!-- labeler:release -->");
    }

    #[test]
    fn test_event_titles() {
        assert_eq!(completed().title(), "Description of #42 has 1 invalid value(s)");
        let started = NotifyEvent::ValidationStarted {
            issue_number: 42,
            head_sha: "abc".to_string(),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(started.title(), "Validating description of #42");
    }

    #[tokio::test]
    async fn test_failing_channel_does_not_stop_others() {
        let mut failing = MockNotifyChannel::new();
        failing.expect_name().return_const("failing");
        failing.expect_enabled().return_const(true);
        failing
            .expect_send()
            .times(1)
            .returning(|_| Err(ChannelError::Other("boom".to_string())));

        let mut healthy = MockNotifyChannel::new();
        healthy.expect_name().return_const("healthy");
        healthy.expect_enabled().return_const(true);
        healthy.expect_send().times(1).returning(|_| Ok(()));

        let notifier = Notifier::with_channels(vec![Arc::new(failing), Arc::new(healthy)]);
        let results = notifier.notify_and_collect(&completed()).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "failing");
        assert!(results[0].1.is_err());
        assert_eq!(results[1].0, "healthy");
        assert!(results[1].1.is_ok());
    }

    #[tokio::test]
    async fn test_disabled_channel_is_skipped() {
        let mut off = MockNotifyChannel::new();
        off.expect_name().return_const("off");
        off.expect_enabled().return_const(false);
        off.expect_send().times(0);

        let notifier = Notifier::with_channels(vec![Arc::new(off)]);
        assert!(notifier.notify_and_collect(&completed()).await.is_empty());
    }
}
