//! PR comment channel.
//!
//! Keeps at most one open error comment per [`FailureClass`]: prior comments
//! carrying the class marker are deleted before a new one is posted, and a
//! class that validates cleanly has its old comments removed.

use async_trait::async_trait;
use scm::{GitHubClient, IssueComment};
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::{FailureClass, NotifyEvent};
use crate::NotifyChannel;

pub struct CommentChannel {
    client: GitHubClient,
}

impl CommentChannel {
    #[must_use]
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }

    /// Delete every comment carrying `class`'s marker. Failures are logged
    /// and skipped.
    async fn delete_previous(&self, comments: &[IssueComment], class: FailureClass) -> usize {
        let marker = class.marker();
        let mut deleted = 0;

        for comment in comments.iter().filter(|c| c.contains(&marker)) {
            match self.client.delete_comment(comment.id).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(
                    comment_id = comment.id,
                    class = class.as_str(),
                    error = %e,
                    "Failed to delete previous error comment"
                ),
            }
        }

        deleted
    }
}

#[async_trait]
impl NotifyChannel for CommentChannel {
    fn name(&self) -> &'static str {
        "comment"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let NotifyEvent::ValidationCompleted { issue_number, .. } = event else {
            return Ok(());
        };

        let existing = match self.client.list_comments(*issue_number).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!(error = %e, "Could not list comments, skipping cleanup");
                Vec::new()
            }
        };

        // Every class is cleaned up and posted even if an earlier post fails.
        let mut first_error = None;

        for class in FailureClass::ALL {
            let deleted = self.delete_previous(&existing, class).await;
            if deleted > 0 {
                debug!(class = class.as_str(), deleted, "Removed previous error comments");
            }

            // One comment per class; the first failure is the one reported.
            if let Some(failure) = event.failures_for(class).first() {
                if let Err(e) = self
                    .client
                    .create_comment(*issue_number, &failure.comment_body())
                    .await
                {
                    warn!(class = class.as_str(), error = %e, "Failed to post error comment");
                    first_error.get_or_insert(ChannelError::from(e));
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
