//! Logging-only channel, used for dry runs.

use async_trait::async_trait;
use tracing::info;

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Channel that records events in the log instead of calling GitHub.
pub struct LogChannel;

#[async_trait]
impl NotifyChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        info!(
            issue = event.issue_number(),
            head_sha = %event.head_sha(),
            at = %event.timestamp(),
            "NOTIFY: {}",
            event.title()
        );
        if let NotifyEvent::ValidationCompleted { failures, .. } = event {
            for failure in failures {
                info!(class = failure.class.as_str(), "NOTIFY: {}", failure.message);
            }
        }
        Ok(())
    }
}
