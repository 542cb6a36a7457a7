//! Status command implementation.
//!
//! Reports which items a build would convert, without converting anything.

use std::path::Path;

use anyhow::Result;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use contentpipe_lib::record::RecordError;

use crate::output::{self, OutputFormat, print_info, print_json, print_stat, symbols};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemState {
  item: String,
  stale: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  built_at: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

/// Returns `false` if any item could not be evaluated.
pub fn cmd_status(project: &Path, item: Option<&str>, verbose: bool, format: OutputFormat) -> Result<bool> {
  let loaded = super::load_project(project)?;
  let selection = loaded.project.resolve(item)?;

  let states: Vec<ItemState> = loaded
    .project
    .file_keys(selection)
    .into_iter()
    .map(|key| {
      let stale = loaded.records.needs_rebuild(&key);
      let built_at = loaded
        .records
        .snapshot(&key)
        .and_then(|record| record.output_modified_time())
        .map(|time| humantime::format_rfc3339_seconds(time).to_string());
      let (stale, error) = match stale {
        Ok(stale) => (Some(stale), None),
        Err(e) => (None, Some(describe(&e))),
      };
      ItemState {
        item: key,
        stale,
        built_at,
        error,
      }
    })
    .collect();

  let ok = states.iter().all(|state| state.error.is_none());

  if format.is_json() {
    print_json(&states)?;
    return Ok(ok);
  }

  if states.is_empty() {
    print_info("No content files selected.");
    return Ok(true);
  }

  print_info(&format!("{} ({})", loaded.project.name, loaded.project.dir.display()));
  for state in &states {
    let (symbol, label) = match (state.stale, &state.error) {
      (Some(true), _) => (symbols::STALE.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(), "stale"),
      (Some(false), _) => (symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string(), "up to date"),
      (None, _) => (symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(), "error"),
    };
    println!("  {} {} ({})", symbol, state.item, label);
    if let Some(error) = &state.error {
      println!("      {}", error.if_supports_color(Stream::Stdout, |s| s.red()));
    }
    if verbose && let Some(built_at) = &state.built_at {
      println!("      built {}", built_at);
    }
  }

  println!();
  let stale = states.iter().filter(|s| s.stale == Some(true)).count();
  print_stat("Items", &states.len().to_string());
  print_stat("Stale", &stale.to_string());
  if verbose {
    if let Some(configuration) = &loaded.project.configuration {
      print_stat("Configuration", configuration);
    }
    for reference in &loaded.project.references {
      print_stat("Reference", &reference.display().to_string());
    }
  }
  if !ok {
    output::print_error("Some items could not be evaluated");
  }
  Ok(ok)
}

fn describe(error: &RecordError) -> String {
  match error {
    RecordError::DependencyCycle { cycle, .. } => format!("dependency cycle: {}", cycle.join(" -> ")),
    other => other.to_string(),
  }
}
