//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages, duration formatting and build report rendering.

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use contentpipe_lib::build::{BuildReport, BuildStatus, ItemOutcome};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const SKIP: &str = "-";
  pub const STALE: &str = "~";
}

pub fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let millis = duration.subsec_millis();

  if secs >= 60 {
    let mins = secs / 60;
    let remaining_secs = secs % 60;
    format!("{}m {}s", mins, remaining_secs)
  } else if secs > 0 {
    format!("{}.{:02}s", secs, millis / 10)
  } else {
    format!("{}ms", millis)
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemJson<'a> {
  item: &'a str,
  outcome: ItemOutcome,
  status: BuildStatus,
  #[serde(skip_serializing_if = "Option::is_none")]
  duration_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error_kind: Option<&'static str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportJson<'a> {
  success: bool,
  elapsed_ms: u64,
  items: Vec<ItemJson<'a>>,
}

/// Print a build or clean report, one line per item followed by a summary.
pub fn print_report(report: &BuildReport, format: OutputFormat) -> anyhow::Result<()> {
  if format.is_json() {
    let items = report
      .items
      .iter()
      .map(|(key, item)| ItemJson {
        item: key,
        outcome: item.outcome,
        status: item.status,
        duration_ms: item.duration.map(|d| d.as_millis() as u64),
        error_kind: item.error.as_ref().map(|e| e.kind()),
        error: item.error.as_ref().map(|e| e.to_string()),
      })
      .collect();
    return print_json(&ReportJson {
      success: report.is_success(),
      elapsed_ms: report.elapsed.as_millis() as u64,
      items,
    });
  }

  for (key, item) in &report.items {
    let symbol = match item.outcome {
      ItemOutcome::Built | ItemOutcome::Cleaned => {
        symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()).to_string()
      }
      ItemOutcome::UpToDate => symbols::INFO.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
      ItemOutcome::Skipped | ItemOutcome::Cancelled => {
        symbols::SKIP.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string()
      }
      ItemOutcome::Failed => symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    };
    let mut line = format!("  {} {} ({})", symbol, key, item.outcome);
    if let Some(duration) = item.duration {
      line.push_str(&format!(" in {}", format_duration(duration)));
    }
    println!("{}", line);
    if let Some(error) = &item.error {
      println!("      {}", error.to_string().if_supports_color(Stream::Stdout, |s| s.red()));
    }
  }

  println!();
  let failed = report.items.values().filter(|item| item.outcome.is_failure()).count();
  let summary = format!(
    "{} built, {} up to date, {} cleaned, {} failed in {}",
    report.count(ItemOutcome::Built),
    report.count(ItemOutcome::UpToDate),
    report.count(ItemOutcome::Cleaned),
    failed,
    format_duration(report.elapsed)
  );
  if failed == 0 {
    print_success(&summary);
  } else {
    print_error(&summary);
  }
  Ok(())
}
