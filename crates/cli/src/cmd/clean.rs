//! Implementation of the `contentpipe clean` command.

use std::path::Path;

use anyhow::{Context, Result};

use contentpipe_lib::build::BuildOrchestrator;

use crate::output::{self, OutputFormat};

/// Remove the outputs of the selected items and forget their timestamps.
pub fn cmd_clean(project: &Path, item: Option<&str>, format: OutputFormat) -> Result<bool> {
  let loaded = super::load_project(project)?;
  let selection = loaded.project.resolve(item)?;

  let orchestrator = BuildOrchestrator::without_converter(loaded.project.clone(), loaded.records.clone());

  let report = orchestrator.clean(selection);

  loaded
    .cache
    .save(&loaded.records)
    .with_context(|| format!("Failed to save record cache {}", loaded.cache.path().display()))?;

  output::print_report(&report, format)?;
  Ok(report.is_success())
}
