//! # Label rule table
//!
//! Every workflow decision is a pure function from the current label set
//! and a [`Trigger`] to a list of [`LabelModification`]s. Nothing here talks
//! to GitHub; [`crate::reconcile`] applies the result.
//!
//! | Trigger | Condition | Result |
//! |---|---|---|
//! | issue opened | - | add triage |
//! | PR state | draft | nothing |
//! | PR state | has `release *` | add ready for review |
//! | PR state | has `backport *` only | nothing |
//! | PR state | neither | add triage |
//! | label removed | triage, no release/backport | add triage |
//! | label added | release/backport, triage present | remove triage |
//! | activity | stale present | remove stale |

use crate::description::DescriptionConfig;
use config::LabelNames;
use std::collections::BTreeSet;

/// A single change to an item's labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelModification {
    Add(String),
    Remove(String),
}

impl LabelModification {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Add(l) | Self::Remove(l) => l,
        }
    }
}

/// An event that may trigger label changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    IssueOpened,
    /// A PR was opened, reopened, marked ready, or relabeled.
    PullRequestState { draft: bool },
    LabelAdded(String),
    LabelRemoved(String),
    /// New commits, description edits or a reopen on a PR.
    Activity,
}

/// Current labels on an issue or pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    #[must_use]
    pub fn has_release(&self, names: &LabelNames) -> bool {
        self.0.iter().any(|l| names.is_release(l))
    }

    #[must_use]
    pub fn has_backport(&self, names: &LabelNames) -> bool {
        self.0.iter().any(|l| names.is_backport(l))
    }

    /// Apply modifications in order, returning the resulting set.
    #[must_use]
    pub fn apply(&self, modifications: &[LabelModification]) -> Self {
        let mut next = self.clone();
        for modification in modifications {
            match modification {
                LabelModification::Add(l) => {
                    next.0.insert(l.clone());
                }
                LabelModification::Remove(l) => {
                    next.0.remove(l);
                }
            }
        }
        next
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Evaluates the rule table against label sets.
#[derive(Debug, Clone)]
pub struct RuleEngine<'a> {
    names: &'a LabelNames,
}

impl<'a> RuleEngine<'a> {
    #[must_use]
    pub fn new(names: &'a LabelNames) -> Self {
        Self { names }
    }

    /// Evaluate triggers in order. Each trigger sees the labels produced by
    /// the previous ones; the combined list contains no no-op changes.
    #[must_use]
    pub fn plan(&self, triggers: &[Trigger], labels: &LabelSet) -> Vec<LabelModification> {
        let mut planned = Vec::new();
        let mut state = labels.clone();

        for trigger in triggers {
            let step = self.evaluate(trigger, &state);
            state = state.apply(&step);
            planned.extend(step);
        }

        planned
    }

    /// Evaluate a single trigger.
    #[must_use]
    pub fn evaluate(&self, trigger: &Trigger, labels: &LabelSet) -> Vec<LabelModification> {
        match trigger {
            Trigger::IssueOpened => self.add_if_absent(labels, &self.names.triage),
            Trigger::PullRequestState { draft } => self.pull_request_state(labels, *draft),
            Trigger::LabelRemoved(label) => {
                if *label == self.names.triage && !self.has_target(labels) {
                    self.add_if_absent(labels, &self.names.triage)
                } else {
                    Vec::new()
                }
            }
            Trigger::LabelAdded(label) => {
                if self.names.is_release(label) || self.names.is_backport(label) {
                    self.remove_if_present(labels, &self.names.triage)
                } else {
                    Vec::new()
                }
            }
            Trigger::Activity => self.remove_if_present(labels, &self.names.stale),
        }
    }

    /// Labels implied by a PR's current release/backport state.
    #[must_use]
    pub fn pull_request_state(&self, labels: &LabelSet, draft: bool) -> Vec<LabelModification> {
        if draft {
            return Vec::new();
        }
        if labels.has_release(self.names) {
            return self.add_if_absent(labels, &self.names.ready_for_review);
        }
        if labels.has_backport(self.names) {
            return Vec::new();
        }
        self.add_if_absent(labels, &self.names.triage)
    }

    /// Labels requested by a validated description block.
    ///
    /// A release or backport label is only added when the item has none of
    /// that family yet; an existing one is never replaced.
    #[must_use]
    pub fn description(
        &self,
        labels: &LabelSet,
        config: &DescriptionConfig,
    ) -> Vec<LabelModification> {
        let mut modifications = Vec::new();

        if let Some(version) = &config.release {
            if !labels.has_release(self.names) {
                modifications.push(LabelModification::Add(self.names.release(version)));
            }
        }
        if let Some(version) = &config.backport {
            if !labels.has_backport(self.names) {
                modifications.push(LabelModification::Add(self.names.backport(version)));
            }
        }
        match config.needs_feature_branch {
            Some(true) => {
                modifications.extend(self.add_if_absent(labels, &self.names.feature_branch));
            }
            Some(false) => {
                modifications.extend(self.remove_if_present(labels, &self.names.feature_branch));
            }
            None => {}
        }

        modifications
    }

    fn has_target(&self, labels: &LabelSet) -> bool {
        labels.has_release(self.names) || labels.has_backport(self.names)
    }

    fn add_if_absent(&self, labels: &LabelSet, label: &str) -> Vec<LabelModification> {
        if labels.contains(label) {
            Vec::new()
        } else {
            vec![LabelModification::Add(label.to_string())]
        }
    }

    fn remove_if_present(&self, labels: &LabelSet, label: &str) -> Vec<LabelModification> {
        if labels.contains(label) {
            vec![LabelModification::Remove(label.to_string())]
        } else {
            Vec::new()
        }
    }
}
