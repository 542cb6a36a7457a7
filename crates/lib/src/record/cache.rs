//! Record cache persisted between runs.
//!
//! Without it every run would snapshot fresh timestamps at load time and
//! never notice edits made while the tool was not running.
//!
//! # Cache Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "records": {
//!     "audio/theme.wav": {
//!       "inputPath": "/work/content/audio/theme.wav",
//!       "outputPath": "/work/content/bin/audio/theme.ogg",
//!       "inputModifiedTime": { "secs_since_epoch": 1733667300, "nanos_since_epoch": 0 },
//!       "outputModifiedTime": { "secs_since_epoch": 1733667301, "nanos_since_epoch": 0 },
//!       "dependencies": []
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::STATE_DIR;

use super::{BuildRecord, RecordError, RecordStore};

/// Current cache format version.
pub const CACHE_VERSION: u32 = 1;

/// Cache file name inside the state directory.
pub const CACHE_FILENAME: &str = "records.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
  version: u32,
  records: BTreeMap<String, BuildRecord>,
}

/// Reads and writes the record cache of one project.
#[derive(Debug, Clone)]
pub struct RecordCache {
  path: PathBuf,
}

impl RecordCache {
  pub fn new(path: PathBuf) -> Self {
    Self { path }
  }

  /// The cache location for a project rooted at `project_dir`.
  pub fn for_project(project_dir: &Path) -> Self {
    Self::new(project_dir.join(STATE_DIR).join(CACHE_FILENAME))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load cached records. A missing cache yields an empty map.
  pub fn load(&self) -> Result<BTreeMap<String, BuildRecord>, RecordError> {
    let content = match fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(source) => {
        return Err(RecordError::Io {
          path: self.path.clone(),
          source,
        });
      }
    };

    let file: CacheFile = serde_json::from_str(&content)?;
    if file.version != CACHE_VERSION {
      return Err(RecordError::UnsupportedCacheVersion(file.version));
    }

    debug!(path = ?self.path, records = file.records.len(), "loaded record cache");
    Ok(file.records)
  }

  /// Write every record of `store`.
  ///
  /// Uses atomic write (write to temp, then rename) to prevent corruption.
  pub fn save(&self, store: &RecordStore) -> Result<(), RecordError> {
    if let Some(parent) = self.path.parent() {
      fs::create_dir_all(parent).map_err(io_err(parent))?;
    }

    let file = CacheFile {
      version: CACHE_VERSION,
      records: store.snapshot_all(),
    };
    let content = serde_json::to_string_pretty(&file)?;

    let temp_path = self.path.with_extension("json.tmp");
    fs::write(&temp_path, content).map_err(io_err(&temp_path))?;
    fs::rename(&temp_path, &self.path).map_err(io_err(&self.path))?;

    debug!(path = ?self.path, records = file.records.len(), "saved record cache");
    Ok(())
  }
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> RecordError {
  let path = path.to_path_buf();
  move |source| RecordError::Io { path, source }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::write_file;
  use tempfile::TempDir;

  #[test]
  fn missing_cache_is_empty() {
    let temp = TempDir::new().unwrap();
    let cache = RecordCache::for_project(temp.path());
    assert!(cache.load().unwrap().is_empty());
  }

  #[test]
  fn saved_records_keep_timestamps() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("theme.wav");
    let output = temp.path().join("bin/theme.ogg");
    write_file(&input, "RIFF");
    write_file(&output, "OggS");

    let record = BuildRecord::open(&input, Some(output))
      .unwrap()
      .with_dependencies(["intro.wav"]);
    let mut store = RecordStore::new(temp.path());
    store.insert("theme.wav", record.clone());

    let cache = RecordCache::for_project(temp.path());
    cache.save(&store).unwrap();
    assert!(cache.path().ends_with(".contentpipe/records.json"));

    let loaded = cache.load().unwrap();
    assert_eq!(loaded.get("theme.wav"), Some(&record));
  }

  #[test]
  fn rejects_unknown_version() {
    let temp = TempDir::new().unwrap();
    let cache = RecordCache::for_project(temp.path());
    write_file(cache.path(), r#"{ "version": 99, "records": {} }"#);

    assert!(matches!(cache.load(), Err(RecordError::UnsupportedCacheVersion(99))));
  }

  #[test]
  fn corrupt_cache_is_an_error() {
    let temp = TempDir::new().unwrap();
    let cache = RecordCache::for_project(temp.path());
    write_file(cache.path(), "not json");

    assert!(matches!(cache.load(), Err(RecordError::Cache(_))));
  }
}
