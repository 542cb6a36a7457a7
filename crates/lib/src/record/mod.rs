//! Per-item build records and staleness detection.
//!
//! A [`BuildRecord`] caches the modification times of one content file's input
//! and output as seen at the last refresh. Comparing those snapshots against the
//! live filesystem is the only staleness signal: any timestamp drift counts,
//! content is never hashed.
//!
//! # Submodules
//!
//! - [`store`] - All tracked records, dependency propagation and cycle detection
//! - [`cache`] - On-disk snapshot of records between runs

pub mod cache;
pub mod store;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

pub use cache::RecordCache;
pub use store::{ClaimGuard, RecordStore};

/// Errors raised while reading or evaluating build records.
#[derive(Debug, Error)]
pub enum RecordError {
  /// The input file does not exist. Recoverable: the caller re-evaluates later.
  #[error("source file missing: {}", .0.display())]
  SourceMissing(PathBuf),

  /// Dependencies form a cycle. `cycle` starts and ends at `path`.
  #[error("dependency cycle at {path}: {}", .cycle.join(" -> "))]
  DependencyCycle { path: String, cycle: Vec<String> },

  /// No record is tracked under this key.
  #[error("item is not tracked: {0}")]
  UnknownItem(String),

  /// Another worker currently owns this record.
  #[error("item is already being built: {0}")]
  AlreadyBuilding(String),

  /// Filesystem error other than a missing source.
  #[error("io error on {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The record cache could not be parsed or serialized.
  #[error("record cache error: {0}")]
  Cache(#[from] serde_json::Error),

  /// The record cache was written by an incompatible version.
  #[error("unsupported record cache version: {0}")]
  UnsupportedCacheVersion(u32),
}

/// Last-write time of `path` if it exists as a regular file.
pub(crate) fn file_modified_time(path: &Path) -> Option<SystemTime> {
  let metadata = fs::metadata(path).ok()?;
  if !metadata.is_file() {
    return None;
  }
  metadata.modified().ok()
}

/// Cached filesystem state for one content file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
  input_path: PathBuf,

  /// `None` when the item produces no standalone output.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  output_path: Option<PathBuf>,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  input_modified_time: Option<SystemTime>,

  /// Only ever `Some` if the output existed at the last refresh.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  output_modified_time: Option<SystemTime>,

  #[serde(default)]
  dependencies: Vec<String>,
}

impl BuildRecord {
  /// Create a record without touching the filesystem.
  ///
  /// Timestamps stay unset until [`refresh_modified_time`](Self::refresh_modified_time)
  /// succeeds, so a fresh record reports itself stale.
  pub fn new(input_path: impl Into<PathBuf>, output_path: Option<PathBuf>) -> Self {
    Self {
      input_path: input_path.into(),
      output_path: output_path.filter(|p| !p.as_os_str().is_empty()),
      input_modified_time: None,
      output_modified_time: None,
      dependencies: Vec::new(),
    }
  }

  /// Create a record and snapshot its timestamps immediately.
  pub fn open(input_path: impl Into<PathBuf>, output_path: Option<PathBuf>) -> Result<Self, RecordError> {
    let mut record = Self::new(input_path, output_path);
    record.refresh_modified_time()?;
    Ok(record)
  }

  /// Append a dependency, ignoring duplicates. Insertion order is kept.
  pub fn add_dependency(&mut self, dependency: impl Into<String>) {
    let dependency = dependency.into();
    if !self.dependencies.contains(&dependency) {
      self.dependencies.push(dependency);
    }
  }

  pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    for dependency in dependencies {
      self.add_dependency(dependency);
    }
    self
  }

  /// Adopt the cached timestamps of `previous` if it describes the same files.
  ///
  /// Returns `true` when the timestamps were taken over.
  pub fn adopt_timestamps(&mut self, previous: &BuildRecord) -> bool {
    if previous.input_path != self.input_path || previous.output_path != self.output_path {
      return false;
    }
    self.input_modified_time = previous.input_modified_time;
    self.output_modified_time = previous.output_modified_time;
    true
  }

  pub fn input_path(&self) -> &Path {
    &self.input_path
  }

  pub fn output_path(&self) -> Option<&Path> {
    self.output_path.as_deref()
  }

  pub fn input_modified_time(&self) -> Option<SystemTime> {
    self.input_modified_time
  }

  pub fn output_modified_time(&self) -> Option<SystemTime> {
    self.output_modified_time
  }

  pub fn dependencies(&self) -> &[String] {
    &self.dependencies
  }

  /// Snapshot the current input and output timestamps.
  ///
  /// The input is read unconditionally and yields [`RecordError::SourceMissing`]
  /// if it is gone. The output timestamp is cleared when there is no output path
  /// or the file does not exist.
  pub fn refresh_modified_time(&mut self) -> Result<(), RecordError> {
    let input_time = match fs::metadata(&self.input_path) {
      Ok(metadata) if metadata.is_file() => metadata.modified().map_err(|source| RecordError::Io {
        path: self.input_path.clone(),
        source,
      })?,
      Ok(_) => return Err(RecordError::SourceMissing(self.input_path.clone())),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(RecordError::SourceMissing(self.input_path.clone()));
      }
      Err(source) => {
        return Err(RecordError::Io {
          path: self.input_path.clone(),
          source,
        });
      }
    };

    self.input_modified_time = Some(input_time);
    self.output_modified_time = self.output_path.as_deref().and_then(file_modified_time);

    trace!(
      input = ?self.input_path,
      output = ?self.output_path,
      output_present = self.output_modified_time.is_some(),
      "refreshed record timestamps"
    );
    Ok(())
  }

  /// `true` if there is nothing to build or the output file exists.
  pub fn is_built(&self) -> bool {
    match &self.output_path {
      None => true,
      Some(output) => output.is_file(),
    }
  }

  /// `true` if the output must be regenerated.
  ///
  /// Stale when the output is missing, the input is missing, or either file's
  /// last-write time differs from the cached snapshot.
  pub fn needs_rebuild(&self) -> bool {
    if !self.is_built() {
      return true;
    }

    let Some(input_time) = file_modified_time(&self.input_path) else {
      return true;
    };
    if self.input_modified_time != Some(input_time) {
      return true;
    }

    match &self.output_path {
      None => false,
      Some(output) => match file_modified_time(output) {
        None => true,
        Some(output_time) => self.output_modified_time != Some(output_time),
      },
    }
  }

  /// Remove the output file (if any) and forget its timestamp.
  ///
  /// The input is never touched. Returns `true` if a file was removed.
  pub fn clean(&mut self) -> Result<bool, RecordError> {
    self.output_modified_time = None;

    let Some(output) = &self.output_path else {
      return Ok(false);
    };

    match fs::remove_file(output) {
      Ok(()) => {
        debug!(output = ?output, "removed output");
        Ok(true)
      }
      Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
      Err(source) => Err(RecordError::Io {
        path: output.clone(),
        source,
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{set_mtime, write_file};
  use std::time::Duration;
  use tempfile::TempDir;

  fn fixture(temp: &TempDir) -> (PathBuf, PathBuf) {
    let input = temp.path().join("theme.wav");
    let output = temp.path().join("bin").join("theme.ogg");
    write_file(&input, "RIFF");
    write_file(&output, "OggS");
    (input, output)
  }

  #[test]
  fn empty_output_is_always_built() {
    let temp = TempDir::new().unwrap();
    let record = BuildRecord::new(temp.path().join("missing.wav"), None);
    assert!(record.is_built());

    let record = BuildRecord::new(temp.path().join("missing.wav"), Some(PathBuf::new()));
    assert!(record.output_path().is_none());
    assert!(record.is_built());
  }

  #[test]
  fn is_built_tracks_output_presence() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::new(&input, Some(output.clone()));
    assert!(record.is_built());

    fs::remove_file(&output).unwrap();
    assert!(!record.is_built());
  }

  #[test]
  fn fresh_refresh_is_up_to_date() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::open(&input, Some(output)).unwrap();
    assert!(!record.needs_rebuild());
  }

  #[test]
  fn unrefreshed_record_is_stale() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::new(&input, Some(output));
    assert!(record.needs_rebuild());
  }

  #[test]
  fn touching_input_makes_stale() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::open(&input, Some(output)).unwrap();

    let later = record.input_modified_time().unwrap() + Duration::from_secs(10);
    set_mtime(&input, later);

    assert!(record.needs_rebuild());
  }

  #[test]
  fn deleting_output_makes_stale() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::open(&input, Some(output.clone())).unwrap();

    fs::remove_file(&output).unwrap();

    assert!(record.needs_rebuild());
  }

  #[test]
  fn touching_output_makes_stale() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let record = BuildRecord::open(&input, Some(output.clone())).unwrap();

    let earlier = record.output_modified_time().unwrap() - Duration::from_secs(30);
    set_mtime(&output, earlier);

    assert!(record.needs_rebuild());
  }

  #[test]
  fn output_less_record_still_sees_input_changes() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("notes.txt");
    write_file(&input, "v1");
    let record = BuildRecord::open(&input, None).unwrap();
    assert!(!record.needs_rebuild());

    set_mtime(&input, record.input_modified_time().unwrap() + Duration::from_secs(5));
    assert!(record.is_built());
    assert!(record.needs_rebuild());
  }

  #[test]
  fn refresh_reports_missing_source() {
    let temp = TempDir::new().unwrap();
    let mut record = BuildRecord::new(temp.path().join("gone.wav"), None);

    let err = record.refresh_modified_time().unwrap_err();
    assert!(matches!(err, RecordError::SourceMissing(_)));
    assert!(record.needs_rebuild());
  }

  #[test]
  fn refresh_leaves_absent_output_unset() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("theme.wav");
    write_file(&input, "RIFF");
    let record = BuildRecord::open(&input, Some(temp.path().join("out.ogg"))).unwrap();

    assert!(record.input_modified_time().is_some());
    assert!(record.output_modified_time().is_none());
  }

  #[test]
  fn clean_removes_output_but_not_input() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let mut record = BuildRecord::open(&input, Some(output.clone())).unwrap();

    assert!(record.clean().unwrap());
    assert!(!output.exists());
    assert!(input.exists());
    assert!(record.output_modified_time().is_none());
    assert!(record.needs_rebuild());

    assert!(!record.clean().unwrap());
  }

  #[test]
  fn dependencies_keep_insertion_order_without_duplicates() {
    let record = BuildRecord::new("a.wav", None).with_dependencies(["c", "a", "c", "b"]);
    assert_eq!(record.dependencies(), &["c", "a", "b"]);
  }

  #[test]
  fn adopt_timestamps_requires_same_paths() {
    let temp = TempDir::new().unwrap();
    let (input, output) = fixture(&temp);
    let cached = BuildRecord::open(&input, Some(output.clone())).unwrap();

    let mut same = BuildRecord::new(&input, Some(output));
    assert!(same.adopt_timestamps(&cached));
    assert_eq!(same.input_modified_time(), cached.input_modified_time());

    let mut other = BuildRecord::new(&input, Some(temp.path().join("elsewhere.ogg")));
    assert!(!other.adopt_timestamps(&cached));
    assert!(other.input_modified_time().is_none());
  }
}
