//! # PR description configuration block
//!
//! Authors request labels by putting a fenced YAML block in the pull
//! request description:
//!
//! ````text
//! ```yaml
//! release: 2.1
//! backport: 2.0       # optional
//! needs_feature_branch: false
//! ```
//! ````
//!
//! Only the first `yaml`/`yml` block that mentions a recognized key is read.
//! Lines are matched individually rather than parsed as a YAML document so
//! that a malformed unrelated line does not discard the whole block.

use config::LabelerConfig;
use notify::{FailureClass, ValidationFailure};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::debug;

static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s{0,3}(`{3,}|~{3,})\s*([A-Za-z0-9_+-]*)").unwrap());

static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(release|backport|needs_feature_branch)\s*:(.*)$").unwrap()
});

/// Keys recognized inside the configuration block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigKey {
    Release,
    Backport,
    NeedsFeatureBranch,
}

impl ConfigKey {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "release" => Some(Self::Release),
            "backport" => Some(Self::Backport),
            "needs_feature_branch" => Some(Self::NeedsFeatureBranch),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_boolean(&self) -> bool {
        matches!(self, Self::NeedsFeatureBranch)
    }

    #[must_use]
    pub const fn failure_class(&self) -> FailureClass {
        match self {
            Self::Release => FailureClass::Release,
            Self::Backport => FailureClass::Backport,
            Self::NeedsFeatureBranch => FailureClass::NeedsFeatureBranch,
        }
    }
}

/// Normalized `key: value` pairs from the authoritative block.
///
/// Values are stored after normalization but before validation; empty
/// values are kept so callers can tell "present but blank" from "absent".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionBlock {
    pub entries: BTreeMap<ConfigKey, String>,
}

impl DescriptionBlock {
    #[must_use]
    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.entries.get(&key).map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Validated values requested by the description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptionConfig {
    pub release: Option<String>,
    pub backport: Option<String>,
    pub needs_feature_branch: Option<bool>,
}

/// Result of validating a [`DescriptionBlock`]. Invalid keys are left unset
/// in `config` and reported in `failures`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validation {
    pub config: DescriptionConfig,
    pub failures: Vec<ValidationFailure>,
}

impl Validation {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Extract the authoritative configuration block from `text`.
#[must_use]
pub fn parse(text: &str) -> DescriptionBlock {
    let mut open: Option<(char, usize, bool)> = None;
    let mut current = DescriptionBlock::default();

    for line in text.lines() {
        match open {
            None => {
                if let Some(caps) = FENCE.captures(line) {
                    let fence = &caps[1];
                    let tag = caps[2].to_ascii_lowercase();
                    let is_config = tag == "yaml" || tag == "yml";
                    let fence_char = fence.chars().next().unwrap_or('`');
                    open = Some((fence_char, fence.len(), is_config));
                    current = DescriptionBlock::default();
                }
            }
            Some((fence_char, fence_len, is_config)) => {
                if is_closing_fence(line, fence_char, fence_len) {
                    if !current.is_empty() {
                        debug!(keys = current.entries.len(), "Found configuration block");
                        return current;
                    }
                    open = None;
                    continue;
                }

                if !is_config {
                    continue;
                }

                if let Some(caps) = KEY_LINE.captures(line) {
                    if let Some(key) = ConfigKey::from_name(&caps[1]) {
                        current
                            .entries
                            .entry(key)
                            .or_insert_with(|| normalize(&caps[2], key.is_boolean()));
                    }
                }
            }
        }
    }

    // An unterminated fence runs to the end of the text.
    if matches!(open, Some((_, _, true))) {
        return current;
    }
    DescriptionBlock::default()
}

fn is_closing_fence(line: &str, fence_char: char, fence_len: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= fence_len && trimmed.chars().all(|c| c == fence_char)
}

/// Trim, drop a trailing `#` comment, strip one pair of matching quotes, and
/// lowercase boolean values.
#[must_use]
pub fn normalize(raw: &str, boolean: bool) -> String {
    let mut value = raw.trim();
    if let Some(idx) = value.find('#') {
        value = value[..idx].trim();
    }

    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            value = value[1..value.len() - 1].trim();
            break;
        }
    }

    if boolean {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

/// Validate a block against the accepted version lists.
#[must_use]
pub fn validate(block: &DescriptionBlock, config: &LabelerConfig) -> Validation {
    let mut validation = Validation::default();

    for (key, value) in &block.entries {
        if value.is_empty() {
            continue;
        }

        match key {
            ConfigKey::Release => {
                match check_accepted(*key, value, &config.accepted_releases) {
                    Ok(()) => validation.config.release = Some(value.clone()),
                    Err(failure) => validation.failures.push(failure),
                }
            }
            ConfigKey::Backport => {
                match check_accepted(*key, value, &config.accepted_backports) {
                    Ok(()) => validation.config.backport = Some(value.clone()),
                    Err(failure) => validation.failures.push(failure),
                }
            }
            ConfigKey::NeedsFeatureBranch => match value.as_str() {
                "true" => validation.config.needs_feature_branch = Some(true),
                "false" => validation.config.needs_feature_branch = Some(false),
                other => validation.failures.push(ValidationFailure {
                    class: key.failure_class(),
                    message: format!("`{other}` is not a boolean; use `true` or `false`."),
                }),
            },
        }
    }

    validation
}

fn check_accepted(
    key: ConfigKey,
    value: &str,
    accepted: &[String],
) -> Result<(), ValidationFailure> {
    if accepted.iter().any(|a| a == value) {
        return Ok(());
    }

    let listed = if accepted.is_empty() {
        "none are configured".to_string()
    } else {
        accepted
            .iter()
            .map(|a| format!("`{a}`"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    Err(ValidationFailure {
        class: key.failure_class(),
        message: format!(
            "`{value}` is not an accepted {} value. Accepted values: {listed}.",
            key.failure_class().as_str()
        ),
    })
}
