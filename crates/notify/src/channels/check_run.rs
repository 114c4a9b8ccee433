//! Check run channel.
//!
//! Creates an `in_progress` check run when validation starts and completes
//! it with `success` or `failure` when validation ends.

use async_trait::async_trait;
use scm::{CheckConclusion, CheckOutput, GitHubClient};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

pub struct CheckRunChannel {
    client: GitHubClient,
    name: String,
    check_run_id: Mutex<Option<u64>>,
}

impl CheckRunChannel {
    #[must_use]
    pub fn new(client: GitHubClient, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            check_run_id: Mutex::new(None),
        }
    }

    fn output(event: &NotifyEvent) -> (CheckConclusion, CheckOutput) {
        let NotifyEvent::ValidationCompleted { failures, .. } = event else {
            return (
                CheckConclusion::Neutral,
                CheckOutput {
                    title: event.title(),
                    summary: String::new(),
                },
            );
        };

        if failures.is_empty() {
            return (
                CheckConclusion::Success,
                CheckOutput {
                    title: event.title(),
                    summary: "All configuration values are valid.".to_string(),
                },
            );
        }

        let summary = failures
            .iter()
            .map(|f| format!("- `{}`: {}", f.class.as_str(), f.message))
            .collect::<Vec<_>>()
            .join("\n");

        (
            CheckConclusion::Failure,
            CheckOutput {
                title: event.title(),
                summary,
            },
        )
    }
}

#[async_trait]
impl NotifyChannel for CheckRunChannel {
    fn name(&self) -> &'static str {
        "check_run"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let mut current = self.check_run_id.lock().await;

        match event {
            NotifyEvent::ValidationStarted { head_sha, .. } => {
                let run = self.client.create_check_run(&self.name, head_sha).await?;
                debug!(check_run_id = run.id, "Check run started");
                *current = Some(run.id);
            }
            NotifyEvent::ValidationCompleted { head_sha, .. } => {
                let id = match *current {
                    Some(id) => id,
                    None => self.client.create_check_run(&self.name, head_sha).await?.id,
                };
                let (conclusion, output) = Self::output(event);
                self.client.complete_check_run(id, conclusion, &output).await?;
                info!(check_run_id = id, ?conclusion, "Check run completed");
                *current = None;
            }
        }

        Ok(())
    }
}
