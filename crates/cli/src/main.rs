mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use contentpipe_lib::consts::DEFAULT_TOOL_NAME;

use crate::cmd::{cmd_build, cmd_clean, cmd_locate, cmd_status};
use crate::output::OutputFormat;

/// contentpipe - incremental content build pipeline
#[derive(Parser)]
#[command(name = "contentpipe")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Convert stale items
  Build {
    /// Item to build (file or folder, relative to the project). Defaults to everything.
    item: Option<String>,

    /// Project directory or description file
    #[arg(short, long, default_value = ".")]
    project: PathBuf,

    /// Maximum number of converters running at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Converter executable to use instead of searching for one
    #[arg(long)]
    tool: Option<PathBuf>,

    /// Fail instead of asking for the converter's location
    #[arg(long)]
    no_prompt: bool,
  },

  /// Remove built outputs
  Clean {
    /// Item to clean (file or folder, relative to the project). Defaults to everything.
    item: Option<String>,

    /// Project directory or description file
    #[arg(short, long, default_value = ".")]
    project: PathBuf,
  },

  /// Show which items are stale
  Status {
    /// Item to check (file or folder, relative to the project). Defaults to everything.
    item: Option<String>,

    /// Project directory or description file
    #[arg(short, long, default_value = ".")]
    project: PathBuf,
  },

  /// Show which converter executable would be used
  Locate {
    /// Converter name
    #[arg(long, default_value = DEFAULT_TOOL_NAME)]
    tool_name: String,
  },
}

fn main() -> Result<ExitCode> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let success = match cli.command {
    Commands::Build {
      item,
      project,
      jobs,
      tool,
      no_prompt,
    } => cmd_build(
      cmd::BuildOptions {
        project,
        item,
        jobs,
        tool,
        no_prompt,
      },
      cli.output,
    )?,
    Commands::Clean { item, project } => cmd_clean(&project, item.as_deref(), cli.output)?,
    Commands::Status { item, project } => cmd_status(&project, item.as_deref(), cli.verbose, cli.output)?,
    Commands::Locate { tool_name } => cmd_locate(&tool_name, cli.output)?,
  };

  Ok(if success { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Log to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
  let default_level = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}
