//! Run summary types
//!
//! Provides structures for tracking what happened to each environment file
//! and to the run as a whole.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Outcome of the update branch for one environment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Updating was not requested
    NotRequested,
    /// The spec was rewritten with newer versions
    Updated,
    /// Resolved versions already matched the spec
    Unchanged,
    /// Updating would downgrade these packages; the file was left alone
    Conflict { packages: Vec<String> },
}

impl UpdateStatus {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateStatus::Updated)
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, UpdateStatus::Conflict { .. })
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStatus::NotRequested => write!(f, "not requested"),
            UpdateStatus::Updated => write!(f, "updated"),
            UpdateStatus::Unchanged => write!(f, "no updates"),
            UpdateStatus::Conflict { packages } => {
                write!(f, "would downgrade {}", packages.join(", "))
            }
        }
    }
}

/// Outcome of the pin branch for one environment file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinStatus {
    /// Pinning was not requested or not needed
    Skipped,
    /// A pin file was written for the first time
    Created,
    /// An existing pin file was overwritten with new content
    Updated,
    /// The pin file already had identical content
    Unchanged,
}

impl PinStatus {
    /// Returns true if a pin file was written
    pub fn is_written(&self) -> bool {
        matches!(self, PinStatus::Created | PinStatus::Updated)
    }
}

impl fmt::Display for PinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinStatus::Skipped => write!(f, "skipped"),
            PinStatus::Created => write!(f, "created"),
            PinStatus::Updated => write!(f, "updated"),
            PinStatus::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Outcome of publishing the changes of one environment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    /// Nothing was queued
    NothingToCommit,
    /// Files were committed and a new pull request opened
    Created { url: String },
    /// Files were committed to the branch of an already open pull request
    Existing,
}

/// What happened to a single environment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvReport {
    /// Path to the environment file
    pub path: PathBuf,
    /// Update branch result
    pub update: UpdateStatus,
    /// Pin branch result
    pub pin: PinStatus,
    /// Pull request result, if publishing was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<PublishOutcome>,
    /// Error message when the file failed under the warn policy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EnvReport {
    /// Creates a fresh report for a file about to be processed
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            update: UpdateStatus::NotRequested,
            pin: PinStatus::Skipped,
            publish: None,
            error: None,
        }
    }

    /// Returns true if this file failed
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Returns true if any file on disk was changed
    pub fn has_changes(&self) -> bool {
        self.update.is_updated() || self.pin.is_written()
    }
}

/// Overall summary of a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Reports in processing order
    pub envs: Vec<EnvReport>,
}

impl RunSummary {
    /// Creates an empty summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file report
    pub fn add(&mut self, report: EnvReport) {
        self.envs.push(report);
    }

    /// Number of files processed
    pub fn files_processed(&self) -> usize {
        self.envs.len()
    }

    /// Number of files whose spec was rewritten
    pub fn files_updated(&self) -> usize {
        self.envs.iter().filter(|e| e.update.is_updated()).count()
    }

    /// Number of pin files written
    pub fn pins_written(&self) -> usize {
        self.envs.iter().filter(|e| e.pin.is_written()).count()
    }

    /// Number of files that failed under the warn policy
    pub fn files_failed(&self) -> usize {
        self.envs.iter().filter(|e| e.is_failed()).count()
    }

    /// Returns true when at least one file was processed and none went
    /// through: each one either failed or would have downgraded packages
    pub fn all_failed(&self) -> bool {
        !self.envs.is_empty()
            && self
                .envs
                .iter()
                .all(|e| e.is_failed() || e.update.is_conflict())
    }
}
