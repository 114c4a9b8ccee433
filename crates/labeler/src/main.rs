//! CLI for the repository labeler
//!
//! Run `labeler --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::LabelerConfig;
use labeler::{Artifacts, Decision, EventRecord, Labeler};
use notify::Notifier;
use scm::GitHubClient;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "labeler")]
#[command(about = "Issue and pull request label automation")]
#[command(version)]
struct Cli {
    /// Path to the labeler configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Repository in owner/repo format
    #[arg(long, env = "GITHUB_REPOSITORY", global = true)]
    repository: Option<String>,

    /// GitHub REST API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = "https://api.github.com", global = true)]
    api_url: String,

    /// Report what would change without touching GitHub
    #[arg(long, global = true)]
    dry_run: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply label rules for the current event
    Handle(EventArgs),

    /// Capture the current event and PR description for a later `apply` run
    Collect {
        #[command(flatten)]
        event: EventArgs,

        /// Directory to write metadata.json and config.json into
        #[arg(short, long)]
        output_dir: PathBuf,
    },

    /// Validate and apply a description captured by `collect`
    Apply {
        /// Directory holding metadata.json and config.json
        #[arg(short, long)]
        input_dir: PathBuf,
    },

    /// Mark inactive pull requests as stale
    Stale,

    /// Approve and auto-merge an in-policy Dependabot pull request
    Dependabot {
        /// Pull request number
        #[arg(short, long)]
        pr: u64,
    },
}

#[derive(clap::Args)]
struct EventArgs {
    /// Event name
    #[arg(long, env = "GITHUB_EVENT_NAME")]
    event_name: String,

    /// Path to the event payload
    #[arg(long, env = "GITHUB_EVENT_PATH")]
    event_path: PathBuf,
}

impl EventArgs {
    fn read(&self, repository: Option<&str>) -> Result<EventRecord> {
        EventRecord::from_file(&self.event_name, &self.event_path, repository).with_context(|| {
            format!(
                "Failed to read {} event from {}",
                self.event_name,
                self.event_path.display()
            )
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let config = load_config(cli.config.as_deref())?;

    // Collecting needs neither a token nor write access.
    if let Commands::Collect { event, output_dir } = &cli.command {
        let record = event.read(cli.repository.as_deref())?;
        let artifacts = Artifacts::capture(record);
        artifacts
            .save(output_dir)
            .with_context(|| format!("Failed to write artifacts to {}", output_dir.display()))?;
        println!(
            "Captured {} event ({} description keys) into {}",
            artifacts.record.event_type,
            artifacts.block.entries.len(),
            output_dir.display()
        );
        return Ok(());
    }

    let repository = cli
        .repository
        .clone()
        .context("Repository not set (use --repository or GITHUB_REPOSITORY)")?;
    if !guard(&config, &repository) {
        return Ok(());
    }
    let token = cli
        .token
        .clone()
        .context("GitHub token not set (use --token or GITHUB_TOKEN)")?;

    let client = GitHubClient::from_repository(&token, &repository)
        .context("Failed to create GitHub client")?
        .with_base_url(&cli.api_url);
    let notifier = if cli.dry_run {
        Notifier::logging_only()
    } else {
        Notifier::for_github(client.clone(), &config.check_run_name)
    };
    let labeler = Labeler::new(client, config, notifier, cli.dry_run);

    match cli.command {
        Commands::Handle(event) => {
            let record = event.read(Some(&repository))?;
            let report = labeler.handle_event(record).await?;
            println!("Added: {:?}, removed: {:?}", report.added, report.removed);
        }
        Commands::Apply { input_dir } => {
            let retention = labeler.config().artifact_retention_days;
            let artifacts = Artifacts::load(&input_dir, retention, chrono::Utc::now())
                .with_context(|| format!("Failed to load artifacts from {}", input_dir.display()))?;
            if !guard(labeler.config(), &artifacts.record.repository) {
                return Ok(());
            }
            let outcome = labeler.apply_description(&artifacts).await?;
            for failure in &outcome.validation.failures {
                println!("Invalid {}: {}", failure.class.as_str(), failure.message);
            }
            println!(
                "Added: {:?}, removed: {:?}",
                outcome.report.added, outcome.report.removed
            );
        }
        Commands::Stale => {
            let report = labeler
                .sweep_stale(chrono::Utc::now())
                .await
                .context("Stale sweep failed")?;
            println!(
                "Examined {} PRs: {} marked stale, {} failed",
                report.examined,
                report.marked.len(),
                report.failed.len()
            );
            for (number, error) in &report.failed {
                println!("  #{number}: {error}");
            }
        }
        Commands::Dependabot { pr } => {
            match labeler
                .auto_merge(pr)
                .await
                .with_context(|| format!("Dependabot auto-merge failed for #{pr}"))?
            {
                Decision::Merge => println!("Auto-merge enabled for #{pr}"),
                Decision::Skip(reason) => println!("Skipped #{pr}: {reason}"),
            }
        }
        // Handled before the client is built.
        Commands::Collect { .. } => {}
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<LabelerConfig> {
    match path {
        Some(path) => LabelerConfig::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => LabelerConfig::load().context("Failed to load config"),
    }
}

fn guard(config: &LabelerConfig, repository: &str) -> bool {
    if config.guard_allows(repository) {
        return true;
    }
    warn!(
        repository,
        expected = %config.repository,
        "Repository does not match the configured guard, nothing to do"
    );
    info!("Exiting without changes");
    false
}
