//! Per-item build status.
//!
//! A status is a set of [`BuildStep`]s rather than a single state, because an
//! item can be `Finished` and `Built` at once. Two combinations are rejected:
//! an item that is still building, or was aborted, cannot also be built.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStep {
  /// The output was removed.
  Clean,
  /// A build is in progress.
  Build,
  /// The build was stopped before it completed.
  Abort,
  /// A build ran to completion during this pass.
  Finished,
  /// The output is present and up to date.
  Built,
}

impl BuildStep {
  pub const ALL: [BuildStep; 5] = [Self::Clean, Self::Build, Self::Abort, Self::Finished, Self::Built];

  fn bit(self) -> u8 {
    1 << (self as u8)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Clean => "clean",
      Self::Build => "build",
      Self::Abort => "abort",
      Self::Finished => "finished",
      Self::Built => "built",
    }
  }
}

impl fmt::Display for BuildStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal build status: {0}")]
pub struct IllegalStatus(pub BuildStatus);

/// A legal combination of [`BuildStep`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BuildStatus(u8);

impl BuildStatus {
  pub const NONE: BuildStatus = BuildStatus(0);

  /// Combine `steps`, rejecting `Build|Built` and `Abort|Built`.
  pub fn new(steps: &[BuildStep]) -> Result<Self, IllegalStatus> {
    let status = Self(steps.iter().fold(0, |bits, step| bits | step.bit()));
    if status.contains(BuildStep::Built) && (status.contains(BuildStep::Build) || status.contains(BuildStep::Abort)) {
      return Err(IllegalStatus(status));
    }
    Ok(status)
  }

  pub fn only(step: BuildStep) -> Self {
    Self(step.bit())
  }

  /// An up-to-date item that needed no work.
  pub fn built() -> Self {
    Self::only(BuildStep::Built)
  }

  pub fn building() -> Self {
    Self::only(BuildStep::Build)
  }

  pub fn cleaned() -> Self {
    Self::only(BuildStep::Clean)
  }

  pub fn contains(self, step: BuildStep) -> bool {
    self.0 & step.bit() != 0
  }

  pub fn is_empty(self) -> bool {
    self.0 == 0
  }

  /// Steps in declaration order.
  pub fn steps(self) -> Vec<BuildStep> {
    BuildStep::ALL.into_iter().filter(|&step| self.contains(step)).collect()
  }

  /// `Build` completed: drop `Build`, add `Finished|Built`.
  pub fn finish(self) -> Self {
    Self((self.0 & !BuildStep::Build.bit()) | BuildStep::Finished.bit() | BuildStep::Built.bit())
  }

  /// Stop the item: add `Abort`, drop `Built` so the result stays legal.
  pub fn abort(self) -> Self {
    Self((self.0 & !BuildStep::Built.bit()) | BuildStep::Abort.bit())
  }

  pub fn is_aborted(self) -> bool {
    self.contains(BuildStep::Abort)
  }
}

impl fmt::Display for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return f.write_str("none");
    }
    let names: Vec<&str> = self.steps().into_iter().map(BuildStep::as_str).collect();
    f.write_str(&names.join("|"))
  }
}

impl fmt::Debug for BuildStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "BuildStatus({})", self)
  }
}

impl Serialize for BuildStatus {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    self.steps().serialize(serializer)
  }
}
