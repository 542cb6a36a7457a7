//! Build orchestration.
//!
//! A pass:
//! 1. Resolves the selection to files and pulls in their tracked dependencies
//! 2. Groups them into waves with [`BuildDag`]
//! 3. Runs each wave on a bounded pool, one task per item
//! 4. Skips dependents of failed items and collects every outcome
//!
//! Per item the task claims the record, asks the store whether it is stale,
//! converts it if so and refreshes the record only after a successful
//! conversion. Item failures never stop the pass.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::content::{ContentProject, NodeId};
use crate::record::{RecordError, RecordStore};

use super::{
  BuildConfig, BuildDag, BuildError, BuildReport, BuildStatus, BuildStep, ConversionJob, Converter, ItemOutcome,
  ItemReport,
};

/// Current status of every item touched by this orchestrator.
#[derive(Debug, Clone, Default)]
struct StatusBoard(Arc<Mutex<BTreeMap<String, BuildStatus>>>);

impl StatusBoard {
  fn set(&self, key: &str, status: BuildStatus) -> BuildStatus {
    self.0.lock().insert(key.to_string(), status);
    status
  }

  fn update(&self, key: &str, f: impl FnOnce(BuildStatus) -> BuildStatus) -> BuildStatus {
    let mut board = self.0.lock();
    let status = board.entry(key.to_string()).or_default();
    *status = f(*status);
    *status
  }

  fn get(&self, key: &str) -> BuildStatus {
    self.0.lock().get(key).copied().unwrap_or_default()
  }

  fn snapshot(&self) -> BTreeMap<String, BuildStatus> {
    self.0.lock().clone()
  }
}

/// Drives build and clean passes over one project.
pub struct BuildOrchestrator<C> {
  project: Arc<ContentProject>,
  records: Arc<RecordStore>,
  converter: Arc<C>,
  config: BuildConfig,
  cancel: CancellationToken,
  statuses: StatusBoard,
}

impl BuildOrchestrator<()> {
  /// An orchestrator for passes that never convert, such as clean and status.
  pub fn without_converter(project: Arc<ContentProject>, records: Arc<RecordStore>) -> Self {
    Self::new(project, records, Arc::new(()))
  }
}

impl<C> BuildOrchestrator<C> {
  pub fn new(project: Arc<ContentProject>, records: Arc<RecordStore>, converter: Arc<C>) -> Self {
    Self {
      project,
      records,
      converter,
      config: BuildConfig::default(),
      cancel: CancellationToken::new(),
      statuses: StatusBoard::default(),
    }
  }

  pub fn with_config(mut self, config: BuildConfig) -> Self {
    self.config = config;
    self
  }

  /// Share an externally owned cancellation token, e.g. one tied to Ctrl-C.
  pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
    self.cancel = token;
    self
  }

  pub fn project(&self) -> &ContentProject {
    &self.project
  }

  pub fn records(&self) -> &RecordStore {
    &self.records
  }

  /// Token that stops the current and any later pass once cancelled.
  pub fn cancellation_token(&self) -> CancellationToken {
    self.cancel.clone()
  }

  pub fn cancel(&self) {
    self.cancel.cancel();
  }

  /// Status of `key`, empty if it was never touched.
  pub fn item_status(&self, key: &str) -> BuildStatus {
    self.statuses.get(key)
  }

  pub fn statuses(&self) -> BTreeMap<String, BuildStatus> {
    self.statuses.snapshot()
  }

  /// Remove the outputs of every file at or below `item`.
  pub fn clean(&self, item: NodeId) -> BuildReport {
    let keys = self.project.file_keys(item);
    self.clean_keys(&keys)
  }

  pub fn clean_keys(&self, keys: &[String]) -> BuildReport {
    let started = Instant::now();
    let mut report = BuildReport::default();

    for key in keys {
      if self.cancel.is_cancelled() {
        report.insert(key.clone(), self.cancelled(key));
        continue;
      }

      let result = self.records.claim(key).and_then(|_claim| self.records.clean(key));
      let item_report = match result {
        Ok(removed) => {
          debug!(item = %key, removed, "cleaned");
          ItemReport::ok(ItemOutcome::Cleaned, self.statuses.set(key, BuildStatus::cleaned()))
        }
        Err(e) => {
          error!(item = %key, error = %e, "clean failed");
          let status = self.statuses.update(key, BuildStatus::abort);
          ItemReport::failed(ItemOutcome::Failed, status, e.into())
        }
      };
      report.insert(key.clone(), item_report);
    }

    report.elapsed = started.elapsed();
    info!(cleaned = report.count(ItemOutcome::Cleaned), "clean complete");
    report
  }

  /// Staleness of every file at or below `item`, without side effects.
  pub fn status(&self, item: NodeId) -> Vec<(String, Result<bool, RecordError>)> {
    self
      .project
      .file_keys(item)
      .into_iter()
      .map(|key| {
        let stale = self.records.needs_rebuild(&key);
        (key, stale)
      })
      .collect()
  }

  /// `keys` followed by every tracked dependency reachable from them, without duplicates.
  fn with_dependencies(&self, keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut queue: VecDeque<String> = keys.iter().cloned().collect();

    while let Some(key) = queue.pop_front() {
      if !seen.insert(key.clone()) {
        continue;
      }
      queue.extend(self.records.tracked_dependencies(&key));
      ordered.push(key);
    }
    ordered
  }

  fn cancelled(&self, key: &str) -> ItemReport {
    let status = self.statuses.update(key, BuildStatus::abort);
    ItemReport::failed(ItemOutcome::Cancelled, status, BuildError::Cancelled)
  }

  fn job(&self, key: &str) -> Option<ConversionJob> {
    let item = self.project.file(key)?;
    let output = item.output.clone()?;
    Some(ConversionJob {
      key: key.to_string(),
      input: item.input.clone(),
      output,
      arguments: item.arguments.clone(),
      configuration: self.project.configuration.clone(),
    })
  }
}

impl<C: Converter> BuildOrchestrator<C> {
  /// Build every file at or below `item`.
  pub async fn build(&self, item: NodeId) -> BuildReport {
    let keys = self.project.file_keys(item);
    self.build_keys(&keys).await
  }

  /// Build the given items and their tracked dependencies.
  pub async fn build_keys(&self, keys: &[String]) -> BuildReport {
    let started = Instant::now();
    let mut report = BuildReport::default();

    let keys = self.with_dependencies(keys);
    let dag = BuildDag::new(&self.records, &keys);
    let schedule = dag.schedule();

    info!(
      items = keys.len(),
      waves = schedule.waves.len(),
      parallelism = self.config.parallelism,
      "starting build"
    );

    let mut failed: HashSet<String> = HashSet::new();

    for key in &schedule.blocked {
      let error = match self.records.needs_rebuild(key) {
        Err(e) => BuildError::from(e),
        Ok(_) => BuildError::DependencyFailed(key.clone()),
      };
      error!(item = %key, error = %error, "item cannot be scheduled");
      let status = self.statuses.set(key, BuildStatus::only(BuildStep::Abort));
      report.insert(key.clone(), ItemReport::failed(ItemOutcome::Failed, status, error));
      failed.insert(key.clone());
    }

    let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));

    for (wave_idx, wave) in schedule.waves.iter().enumerate() {
      if self.cancel.is_cancelled() {
        for key in wave {
          report.insert(key.clone(), self.cancelled(key));
        }
        continue;
      }

      debug!(wave = wave_idx, items = wave.len(), "executing wave");

      let mut ready = Vec::new();
      for key in wave {
        let failed_dep = dag.dependencies(key).into_iter().find(|dep| failed.contains(dep));
        if let Some(failed_dep) = failed_dep {
          warn!(item = %key, failed_dep = %failed_dep, "skipping item due to failed dependency");
          let status = self.statuses.set(key, BuildStatus::only(BuildStep::Abort));
          report.insert(
            key.clone(),
            ItemReport::failed(ItemOutcome::Skipped, status, BuildError::DependencyFailed(failed_dep)),
          );
          failed.insert(key.clone());
        } else {
          ready.push(key.clone());
        }
      }

      for (key, item_report) in self.execute_wave(&ready, semaphore.clone()).await {
        if item_report.outcome.is_failure() {
          failed.insert(key.clone());
        }
        report.insert(key, item_report);
      }
    }

    report.elapsed = started.elapsed();
    info!(
      built = report.count(ItemOutcome::Built),
      up_to_date = report.count(ItemOutcome::UpToDate),
      failed = report.failures().count(),
      elapsed_ms = report.elapsed.as_millis() as u64,
      "build complete"
    );
    report
  }

  async fn execute_wave(&self, keys: &[String], semaphore: Arc<Semaphore>) -> Vec<(String, ItemReport)> {
    let mut join_set = JoinSet::new();

    for key in keys {
      let task = ItemTask {
        key: key.clone(),
        input: self.project.file(key).map(|item| item.input.clone()),
        job: self.job(key),
        records: self.records.clone(),
        converter: self.converter.clone(),
        statuses: self.statuses.clone(),
        cancel: self.cancel.clone(),
      };
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let Ok(_permit) = semaphore.acquire().await else {
          let report = ItemReport::failed(ItemOutcome::Cancelled, task.statuses.get(&task.key), BuildError::Cancelled);
          return (task.key, report);
        };
        let report = task.run().await;
        (task.key, report)
      });
    }

    let mut results = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      match joined {
        Ok(result) => results.push(result),
        Err(e) => error!(error = %e, "build task panicked"),
      }
    }
    results
  }
}

/// Everything one worker needs to build one item.
struct ItemTask<C> {
  key: String,
  /// `None` when the key is not a file of the project.
  input: Option<PathBuf>,
  /// `None` when the item has no output to convert into.
  job: Option<ConversionJob>,
  records: Arc<RecordStore>,
  converter: Arc<C>,
  statuses: StatusBoard,
  cancel: CancellationToken,
}

impl<C: Converter> ItemTask<C> {
  async fn run(&self) -> ItemReport {
    let key = self.key.as_str();

    if self.cancel.is_cancelled() {
      let status = self.statuses.update(key, BuildStatus::abort);
      return ItemReport::failed(ItemOutcome::Cancelled, status, BuildError::Cancelled);
    }

    let Some(input) = &self.input else {
      return self.abort_before_build(RecordError::UnknownItem(key.to_string()).into());
    };

    let _claim = match self.records.claim(key) {
      Ok(claim) => claim,
      Err(e) => {
        warn!(item = %key, error = %e, "item not claimed");
        return ItemReport::failed(ItemOutcome::Failed, self.statuses.get(key), e.into());
      }
    };

    let stale = match self.records.needs_rebuild(key) {
      Ok(stale) => stale,
      Err(e) => return self.abort_before_build(e.into()),
    };
    if !stale {
      debug!(item = %key, "up to date");
      return ItemReport::ok(ItemOutcome::UpToDate, self.statuses.set(key, BuildStatus::built()));
    }

    self.statuses.set(key, BuildStatus::building());
    if !input.is_file() {
      return self.abort(RecordError::SourceMissing(input.clone()).into());
    }

    let started = Instant::now();
    if let Some(job) = &self.job {
      if let Some(parent) = job.output.parent()
        && let Err(source) = tokio::fs::create_dir_all(parent).await
      {
        return self.abort(BuildError::Io {
          path: parent.to_path_buf(),
          source,
        });
      }

      if let Err(e) = self.converter.convert(job).await {
        return self.abort(e);
      }

      if self.cancel.is_cancelled() {
        info!(item = %key, "build cancelled, discarding converter result");
        let status = self.statuses.update(key, BuildStatus::abort);
        return ItemReport::failed(ItemOutcome::Cancelled, status, BuildError::Cancelled);
      }
    }

    if let Err(e) = self.records.refresh(key) {
      return self.abort(e.into());
    }

    let mut report = ItemReport::ok(ItemOutcome::Built, self.statuses.update(key, BuildStatus::finish));
    report.duration = Some(started.elapsed());
    info!(item = %key, "built");
    report
  }

  /// Fail an item that never reached `Build`.
  fn abort_before_build(&self, error: BuildError) -> ItemReport {
    error!(item = %self.key, error = %error, "build failed");
    let status = self.statuses.set(&self.key, BuildStatus::only(BuildStep::Abort));
    ItemReport::failed(ItemOutcome::Failed, status, error)
  }

  /// Fail an item that is in `Build`. Its record keeps the old timestamps.
  fn abort(&self, error: BuildError) -> ItemReport {
    error!(item = %self.key, error = %error, "build failed");
    let status = self.statuses.update(&self.key, BuildStatus::abort);
    ItemReport::failed(ItemOutcome::Failed, status, error)
  }
}
