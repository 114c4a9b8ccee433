//! Notification channel implementations.

pub mod check_run;
pub mod comment;
pub mod log;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::events::NotifyEvent;

/// Trait for notification channels (check runs, PR comments, logs).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Check if this channel is enabled/configured.
    fn enabled(&self) -> bool;

    /// Deliver a notification event through this channel.
    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError>;
}
