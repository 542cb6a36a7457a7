//! The set of tracked build records.
//!
//! Records are keyed by the item's project-relative path and each sits behind
//! its own lock, so independent items can be evaluated and refreshed from
//! different workers. Staleness here includes dependencies: an item is stale
//! when anything it depends on is stale or changed after it was last built.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{BuildRecord, RecordError, file_modified_time};

/// Marks an item as owned by one worker until dropped.
#[derive(Debug)]
pub struct ClaimGuard {
  key: String,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl ClaimGuard {
  pub fn key(&self) -> &str {
    &self.key
  }
}

impl Drop for ClaimGuard {
  fn drop(&mut self) {
    self.in_flight.lock().remove(&self.key);
  }
}

/// Result of evaluating one item during a staleness walk.
#[derive(Debug, Clone, Copy)]
struct Evaluation {
  stale: bool,
  /// Latest recorded change to the item's own files or anything below it.
  /// Items without an output still pass their dependencies' changes upward.
  changed_at: Option<SystemTime>,
}

/// All build records of a project.
#[derive(Debug, Default)]
pub struct RecordStore {
  /// Directory untracked dependency paths are resolved against.
  root: PathBuf,
  records: BTreeMap<String, Arc<Mutex<BuildRecord>>>,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RecordStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      records: BTreeMap::new(),
      in_flight: Arc::new(Mutex::new(HashSet::new())),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Track `record` under `key`, replacing any previous record.
  pub fn insert(&mut self, key: impl Into<String>, record: BuildRecord) {
    self.records.insert(key.into(), Arc::new(Mutex::new(record)));
  }

  /// Stop tracking `key`. The record is dropped with the item.
  pub fn remove(&mut self, key: &str) -> Option<BuildRecord> {
    self
      .records
      .remove(key)
      .map(|record| Arc::try_unwrap(record).map(Mutex::into_inner).unwrap_or_else(|shared| shared.lock().clone()))
  }

  pub fn contains(&self, key: &str) -> bool {
    self.records.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn keys(&self) -> impl Iterator<Item = &str> {
    self.records.keys().map(String::as_str)
  }

  /// A copy of the record as it is right now.
  pub fn snapshot(&self, key: &str) -> Option<BuildRecord> {
    self.records.get(key).map(|record| record.lock().clone())
  }

  /// Copies of every record, ordered by key.
  pub fn snapshot_all(&self) -> BTreeMap<String, BuildRecord> {
    self
      .records
      .iter()
      .map(|(key, record)| (key.clone(), record.lock().clone()))
      .collect()
  }

  /// Dependencies of `key` that are themselves tracked items.
  pub fn tracked_dependencies(&self, key: &str) -> Vec<String> {
    let Some(record) = self.snapshot(key) else {
      return Vec::new();
    };
    record
      .dependencies()
      .iter()
      .filter(|dep| self.records.contains_key(dep.as_str()))
      .cloned()
      .collect()
  }

  /// Reserve `key` for one worker. Fails if another worker holds it.
  pub fn claim(&self, key: &str) -> Result<ClaimGuard, RecordError> {
    if !self.records.contains_key(key) {
      return Err(RecordError::UnknownItem(key.to_string()));
    }
    let mut in_flight = self.in_flight.lock();
    if !in_flight.insert(key.to_string()) {
      return Err(RecordError::AlreadyBuilding(key.to_string()));
    }
    Ok(ClaimGuard {
      key: key.to_string(),
      in_flight: self.in_flight.clone(),
    })
  }

  /// Re-snapshot the timestamps of `key` after a build.
  pub fn refresh(&self, key: &str) -> Result<(), RecordError> {
    let record = self.get(key)?;
    record.lock().refresh_modified_time()
  }

  /// Remove the output of `key` and forget its timestamp.
  pub fn clean(&self, key: &str) -> Result<bool, RecordError> {
    let record = self.get(key)?;
    record.lock().clean()
  }

  /// Staleness of `key` alone, ignoring dependencies.
  pub fn needs_rebuild_local(&self, key: &str) -> Result<bool, RecordError> {
    let record = self.get(key)?;
    Ok(record.lock().needs_rebuild())
  }

  /// Staleness of `key` including everything it transitively depends on.
  ///
  /// Fails with [`RecordError::DependencyCycle`] if the walk returns to an item
  /// already on the current path.
  pub fn needs_rebuild(&self, key: &str) -> Result<bool, RecordError> {
    let mut path = Vec::new();
    let mut memo = HashMap::new();
    Ok(self.evaluate(key, &mut path, &mut memo)?.stale)
  }

  fn get(&self, key: &str) -> Result<&Arc<Mutex<BuildRecord>>, RecordError> {
    self
      .records
      .get(key)
      .ok_or_else(|| RecordError::UnknownItem(key.to_string()))
  }

  fn evaluate(
    &self,
    key: &str,
    path: &mut Vec<String>,
    memo: &mut HashMap<String, Evaluation>,
  ) -> Result<Evaluation, RecordError> {
    if let Some(&evaluation) = memo.get(key) {
      return Ok(evaluation);
    }

    if let Some(start) = path.iter().position(|k| k == key) {
      let mut cycle = path[start..].to_vec();
      cycle.push(key.to_string());
      return Err(RecordError::DependencyCycle {
        path: key.to_string(),
        cycle,
      });
    }

    // Lock only long enough to copy; recursion must not hold a record lock.
    let record = self.get(key)?.lock().clone();
    let built_at = record.output_modified_time();
    let mut stale = record.needs_rebuild();
    let mut changed_at = record.input_modified_time().max(built_at);

    path.push(key.to_string());
    // Every edge is walked even once stale so cycles are always reported.
    for dep in record.dependencies() {
      let (dep_stale, dep_changed_at) = if self.records.contains_key(dep.as_str()) {
        let evaluation = self.evaluate(dep, path, memo)?;
        (evaluation.stale, evaluation.changed_at)
      } else {
        // Plain file next to the project; a missing one never makes anything stale.
        (false, file_modified_time(&self.root.join(dep)))
      };

      if dep_stale {
        trace!(item = %key, dependency = %dep, "dependency is stale");
        stale = true;
      } else if let (Some(dep_changed_at), Some(built_at)) = (dep_changed_at, built_at)
        && dep_changed_at > built_at
      {
        trace!(item = %key, dependency = %dep, "dependency changed after item was built");
        stale = true;
      }
      changed_at = changed_at.max(dep_changed_at);
    }
    path.pop();

    if stale {
      debug!(item = %key, "item needs rebuild");
    }
    let evaluation = Evaluation { stale, changed_at };
    memo.insert(key.to_string(), evaluation);
    Ok(evaluation)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{set_mtime, write_file};
  use std::time::{Duration, SystemTime};
  use tempfile::TempDir;

  /// Create input/output files for `name` and return an up-to-date record.
  ///
  /// All fixtures share the same timestamps so no output looks newer than another.
  fn built_record(root: &Path, name: &str, deps: &[&str]) -> BuildRecord {
    let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    let input = root.join(name);
    let output = root.join("bin").join(format!("{}.out", name));
    write_file(&input, name);
    write_file(&output, name);
    set_mtime(&input, base);
    set_mtime(&output, base + Duration::from_secs(100));
    BuildRecord::open(&input, Some(output))
      .unwrap()
      .with_dependencies(deps.iter().copied())
  }

  #[test]
  fn up_to_date_chain_is_clean() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &["b"]));
    store.insert("b", built_record(temp.path(), "b", &[]));

    assert!(!store.needs_rebuild("a").unwrap());
    assert!(!store.needs_rebuild("b").unwrap());
  }

  #[test]
  fn stale_dependency_propagates() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &["b"]));
    store.insert("b", built_record(temp.path(), "b", &["c"]));
    store.insert("c", built_record(temp.path(), "c", &[]));

    let c = store.snapshot("c").unwrap();
    set_mtime(c.input_path(), c.input_modified_time().unwrap() + Duration::from_secs(10));

    assert!(!store.needs_rebuild_local("a").unwrap());
    assert!(store.needs_rebuild("a").unwrap());
    assert!(store.needs_rebuild("b").unwrap());
  }

  #[test]
  fn dependency_rebuilt_later_marks_dependent_stale() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &["b"]));
    store.insert("b", built_record(temp.path(), "b", &[]));

    let a = store.snapshot("a").unwrap();
    let b = store.snapshot("b").unwrap();
    let later = a.output_modified_time().unwrap() + Duration::from_secs(60);
    set_mtime(b.output_path().unwrap(), later);
    store.refresh("b").unwrap();

    assert!(!store.needs_rebuild("b").unwrap());
    assert!(store.needs_rebuild("a").unwrap());
  }

  #[test]
  fn changed_dependency_without_output_marks_dependent_stale() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    let shader = built_record(temp.path(), "shader.fx", &["common.fxh"]);
    let built_at = shader.output_modified_time().unwrap();
    store.insert("shader.fx", shader);

    let header = temp.path().join("common.fxh");
    write_file(&header, "float4 tint;");
    set_mtime(&header, built_at - Duration::from_secs(60));
    store.insert("common.fxh", BuildRecord::open(&header, None).unwrap());
    assert!(!store.needs_rebuild("shader.fx").unwrap());

    set_mtime(&header, built_at + Duration::from_secs(60));
    assert!(store.needs_rebuild("shader.fx").unwrap());

    // The header has nothing to convert, so refreshing it is its whole build.
    store.refresh("common.fxh").unwrap();
    assert!(!store.needs_rebuild("common.fxh").unwrap());
    assert!(store.needs_rebuild("shader.fx").unwrap());
  }

  #[test]
  fn change_passes_through_items_without_output() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    let pak = built_record(temp.path(), "game.pak", &["materials.lst"]);
    let built_at = pak.output_modified_time().unwrap();
    store.insert("game.pak", pak);

    for (name, deps) in [("materials.lst", &["common.fxh"][..]), ("common.fxh", &[][..])] {
      let input = temp.path().join(name);
      write_file(&input, name);
      set_mtime(&input, built_at - Duration::from_secs(60));
      store.insert(name, BuildRecord::open(&input, None).unwrap().with_dependencies(deps.iter().copied()));
    }
    assert!(!store.needs_rebuild("game.pak").unwrap());

    set_mtime(&temp.path().join("common.fxh"), built_at + Duration::from_secs(60));
    store.refresh("common.fxh").unwrap();

    assert!(!store.needs_rebuild("materials.lst").unwrap());
    assert!(store.needs_rebuild("game.pak").unwrap());
  }

  #[test]
  fn two_node_cycle_is_rejected() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &["b"]));
    store.insert("b", built_record(temp.path(), "b", &["a"]));

    let err = store.needs_rebuild("a").unwrap_err();
    match err {
      RecordError::DependencyCycle { path, cycle } => {
        assert_eq!(path, "a");
        assert_eq!(cycle, vec!["a", "b", "a"]);
      }
      other => panic!("expected cycle, got {other}"),
    }
    assert!(matches!(
      store.needs_rebuild("b"),
      Err(RecordError::DependencyCycle { .. })
    ));
  }

  #[test]
  fn cycle_reported_even_when_already_stale() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", BuildRecord::new(temp.path().join("a"), None).with_dependencies(["a"]));

    assert!(matches!(
      store.needs_rebuild("a"),
      Err(RecordError::DependencyCycle { .. })
    ));
  }

  #[test]
  fn diamond_is_not_a_cycle() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("top", built_record(temp.path(), "top", &["left", "right"]));
    store.insert("left", built_record(temp.path(), "left", &["base"]));
    store.insert("right", built_record(temp.path(), "right", &["base"]));
    store.insert("base", built_record(temp.path(), "base", &[]));

    assert!(!store.needs_rebuild("top").unwrap());
  }

  #[test]
  fn untracked_file_dependency_newer_than_output() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    let record = built_record(temp.path(), "level.json", &["shared/palette.txt"]);
    let built_at = record.output_modified_time().unwrap();
    store.insert("level.json", record);

    let palette = temp.path().join("shared/palette.txt");
    write_file(&palette, "red");
    set_mtime(&palette, built_at - Duration::from_secs(60));
    assert!(!store.needs_rebuild("level.json").unwrap());

    set_mtime(&palette, built_at + Duration::from_secs(60));
    assert!(store.needs_rebuild("level.json").unwrap());
  }

  #[test]
  fn missing_untracked_dependency_is_ignored() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &["nowhere/x.txt"]));

    assert!(!store.needs_rebuild("a").unwrap());
  }

  #[test]
  fn unknown_item_is_an_error() {
    let store = RecordStore::new("/tmp");
    assert!(matches!(store.needs_rebuild("ghost"), Err(RecordError::UnknownItem(_))));
    assert!(matches!(store.claim("ghost"), Err(RecordError::UnknownItem(_))));
  }

  #[test]
  fn claim_is_exclusive_until_dropped() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", BuildRecord::new(temp.path().join("a"), None));

    let guard = store.claim("a").unwrap();
    assert_eq!(guard.key(), "a");
    assert!(matches!(store.claim("a"), Err(RecordError::AlreadyBuilding(_))));

    drop(guard);
    assert!(store.claim("a").is_ok());
  }

  #[test]
  fn clean_through_store_makes_item_stale() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", built_record(temp.path(), "a", &[]));

    assert!(store.clean("a").unwrap());
    assert!(store.needs_rebuild("a").unwrap());
    assert!(store.snapshot("a").unwrap().output_modified_time().is_none());
  }

  #[test]
  fn tracked_dependencies_filters_plain_files() {
    let temp = TempDir::new().unwrap();
    let mut store = RecordStore::new(temp.path());
    store.insert("a", BuildRecord::new(temp.path().join("a"), None).with_dependencies(["b", "readme.txt"]));
    store.insert("b", BuildRecord::new(temp.path().join("b"), None));

    assert_eq!(store.tracked_dependencies("a"), vec!["b".to_string()]);
    assert!(store.tracked_dependencies("ghost").is_empty());
  }

  #[test]
  fn remove_returns_record() {
    let mut store = RecordStore::new("/tmp");
    store.insert("a", BuildRecord::new("/tmp/a", None));
    let removed = store.remove("a").unwrap();
    assert_eq!(removed.input_path(), Path::new("/tmp/a"));
    assert!(store.is_empty());
  }
}
