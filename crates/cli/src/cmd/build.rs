//! Implementation of the `contentpipe build` command.
//!
//! Builds the selected items, asking on the terminal for the converter's
//! location if it cannot be started, and saves the refreshed records.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use contentpipe_lib::build::{BuildConfig, BuildOrchestrator, ToolConverter};
use contentpipe_lib::tool::{ToolInvoker, ToolLocator, recovery};

use crate::output::{self, OutputFormat};
use crate::prompts;

pub struct BuildOptions {
  pub project: PathBuf,
  pub item: Option<String>,
  pub jobs: Option<usize>,
  /// Use this converter instead of searching for one.
  pub tool: Option<PathBuf>,
  /// Never prompt; a missing converter fails the affected items.
  pub no_prompt: bool,
}

/// Execute the build command.
///
/// Returns `false` if any item failed.
pub fn cmd_build(options: BuildOptions, format: OutputFormat) -> Result<bool> {
  let loaded = super::load_project(&options.project)?;
  let selection = loaded.project.resolve(options.item.as_deref())?;

  let locator = ToolLocator::new(loaded.project.tool.clone());
  let invoker = match options.tool {
    Some(path) => ToolInvoker::with_path(locator, path),
    None => ToolInvoker::new(locator),
  };

  // The prompt runs on its own thread so build workers can wait on it.
  let (client, server) = recovery::channel();
  let interactive = !options.no_prompt && prompts::is_interactive();
  let ui = std::thread::spawn(move || {
    server.serve_blocking(|tool, attempted| prompts::locate_tool(tool, attempted, interactive));
  });

  let mut config = BuildConfig::default();
  if let Some(jobs) = options.jobs {
    config = config.with_parallelism(jobs);
  }

  let converter = ToolConverter::new(Arc::new(invoker.with_recovery(client)));
  let orchestrator = BuildOrchestrator::new(loaded.project.clone(), loaded.records.clone(), Arc::new(converter))
    .with_config(config);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt.block_on(async {
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        warn!("interrupted, finishing running items");
        token.cancel();
      }
    });
    orchestrator.build(selection).await
  });
  drop(rt);

  // Dropping the orchestrator closes the recovery channel and ends the prompt thread.
  drop(orchestrator);
  if ui.join().is_err() {
    warn!("recovery prompt thread panicked");
  }

  loaded
    .cache
    .save(&loaded.records)
    .with_context(|| format!("Failed to save record cache {}", loaded.cache.path().display()))?;
  info!(path = ?loaded.cache.path(), "saved record cache");

  output::print_report(&report, format)?;
  Ok(report.is_success())
}
