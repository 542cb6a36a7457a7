//! Error, result and configuration types for build passes.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::content::ProjectError;
use crate::record::RecordError;
use crate::tool::ToolError;

use super::BuildStatus;

/// Why an item did not build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Record(#[from] RecordError),

  #[error(transparent)]
  Tool(#[from] ToolError),

  #[error(transparent)]
  Project(#[from] ProjectError),

  /// A dependency of this item failed, so it was never attempted.
  #[error("dependency failed: {0}")]
  DependencyFailed(String),

  #[error("build cancelled")]
  Cancelled,

  #[error("io error on {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

impl BuildError {
  /// Short machine-readable name of the failure kind.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Record(RecordError::SourceMissing(_)) => "source-missing",
      Self::Record(RecordError::DependencyCycle { .. }) => "dependency-cycle",
      Self::Record(RecordError::UnknownItem(_)) | Self::Project(ProjectError::UnknownItem(_)) => "unknown-item",
      Self::Record(RecordError::AlreadyBuilding(_)) => "already-building",
      Self::Record(_) => "record",
      Self::Tool(ToolError::ToolNotFound { .. }) => "tool-not-found",
      Self::Tool(ToolError::ProcessLaunch { .. }) => "process-launch",
      Self::Tool(ToolError::ConversionFailed { .. }) => "conversion-failed",
      Self::Tool(_) => "tool",
      Self::Project(_) => "project",
      Self::DependencyFailed(_) => "dependency-failed",
      Self::Cancelled => "cancelled",
      Self::Io { .. } => "io",
    }
  }
}

/// What happened to one item in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemOutcome {
  /// Nothing was stale.
  UpToDate,
  /// The converter ran and succeeded.
  Built,
  /// The output was removed.
  Cleaned,
  /// The item was attempted and failed.
  Failed,
  /// A dependency failed first.
  Skipped,
  /// The pass was cancelled before or while the item ran.
  Cancelled,
}

impl ItemOutcome {
  pub fn is_failure(self) -> bool {
    matches!(self, Self::Failed | Self::Skipped | Self::Cancelled)
  }
}

impl fmt::Display for ItemOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Self::UpToDate => "up to date",
      Self::Built => "built",
      Self::Cleaned => "cleaned",
      Self::Failed => "failed",
      Self::Skipped => "skipped",
      Self::Cancelled => "cancelled",
    };
    f.write_str(s)
  }
}

/// Result of one item.
#[derive(Debug)]
pub struct ItemReport {
  pub outcome: ItemOutcome,
  pub status: BuildStatus,
  pub error: Option<BuildError>,
  /// Time spent converting, when the converter ran.
  pub duration: Option<Duration>,
}

impl ItemReport {
  pub fn ok(outcome: ItemOutcome, status: BuildStatus) -> Self {
    Self {
      outcome,
      status,
      error: None,
      duration: None,
    }
  }

  pub fn failed(outcome: ItemOutcome, status: BuildStatus, error: BuildError) -> Self {
    Self {
      outcome,
      status,
      error: Some(error),
      duration: None,
    }
  }
}

/// Aggregate result of a build or clean pass.
///
/// Failures of individual items never stop the pass; they are collected here.
#[derive(Debug, Default)]
pub struct BuildReport {
  pub items: BTreeMap<String, ItemReport>,
  pub elapsed: Duration,
}

impl BuildReport {
  pub fn insert(&mut self, key: impl Into<String>, report: ItemReport) {
    self.items.insert(key.into(), report);
  }

  pub fn get(&self, key: &str) -> Option<&ItemReport> {
    self.items.get(key)
  }

  /// True if no item failed, was skipped or was cancelled.
  pub fn is_success(&self) -> bool {
    !self.items.values().any(|item| item.outcome.is_failure())
  }

  pub fn count(&self, outcome: ItemOutcome) -> usize {
    self.items.values().filter(|item| item.outcome == outcome).count()
  }

  /// Items that carry an error, ordered by key.
  pub fn failures(&self) -> impl Iterator<Item = (&str, &BuildError)> {
    self
      .items
      .iter()
      .filter_map(|(key, item)| item.error.as_ref().map(|e| (key.as_str(), e)))
  }

  pub fn total(&self) -> usize {
    self.items.len()
  }
}

/// Configuration for a build pass.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  /// Maximum number of converters running at once.
  pub parallelism: usize,
}

impl Default for BuildConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
    }
  }
}

impl BuildConfig {
  pub fn with_parallelism(mut self, parallelism: usize) -> Self {
    self.parallelism = parallelism.max(1);
    self
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
