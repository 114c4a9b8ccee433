//! Label automation for a single GitHub repository.
//!
//! - [`rules`]: the triage/release/backport/stale rule table
//! - [`description`]: the configuration block in PR descriptions
//! - [`reconcile`]: applies label changes through the REST API
//! - [`activity`] and [`stale`]: last-activity detection and the stale sweep
//! - [`event`]: event capture and the artifact hand-off between runs
//! - [`dependabot`]: auto-merge for in-policy dependency updates
//! - [`handler`]: ties the above together per event

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod activity;
pub mod dependabot;
pub mod description;
pub mod event;
pub mod handler;
pub mod reconcile;
pub mod rules;
pub mod stale;

pub use activity::{ActivityAggregator, ActivityReport, ActivitySource};
pub use dependabot::{AutoMerger, Decision, DependabotError};
pub use description::{ConfigKey, DescriptionBlock, DescriptionConfig, Validation};
pub use event::{Artifacts, EventError, EventKind, EventRecord, PrFields};
pub use handler::{ApplyOutcome, HandlerError, Labeler};
pub use reconcile::{LabelReconciler, ReconcileError, ReconcileReport};
pub use rules::{LabelModification, LabelSet, RuleEngine, Trigger};
pub use stale::{StaleSweeper, SweepReport};
