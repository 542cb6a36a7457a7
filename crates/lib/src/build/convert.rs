//! The conversion step.
//!
//! The orchestrator only decides *whether* an item is converted. Turning an
//! input into an output is delegated to a [`Converter`], which for real builds
//! is [`ToolConverter`] running the external tool.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::tool::{ToolInvoker, args::quote_argument};

use super::BuildError;

/// One input to convert into one output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
  pub key: String,
  pub input: PathBuf,
  pub output: PathBuf,
  /// Argument template with `{input}`, `{output}` and `{configuration}` placeholders.
  pub arguments: String,
  /// Build configuration of the project, e.g. `Release`.
  pub configuration: Option<String>,
}

impl ConversionJob {
  /// The argument string with placeholders replaced by quoted paths.
  pub fn command_line(&self) -> String {
    let configuration = self.configuration.as_deref().map(quote_argument).unwrap_or_default();
    let template = self.arguments.replace("{configuration}", &configuration);
    expand_arguments(&template, &self.input, &self.output)
  }
}

/// Substitute `{input}` and `{output}` in `template`.
pub fn expand_arguments(template: &str, input: &Path, output: &Path) -> String {
  template
    .replace("{input}", &quote_argument(&input.display().to_string()))
    .replace("{output}", &quote_argument(&output.display().to_string()))
}

/// Produces an item's output from its input.
pub trait Converter: Send + Sync + 'static {
  fn convert(&self, job: &ConversionJob) -> impl Future<Output = Result<(), BuildError>> + Send;
}

/// Converts by running the external tool once per item.
#[derive(Debug, Clone)]
pub struct ToolConverter {
  invoker: Arc<ToolInvoker>,
}

impl ToolConverter {
  pub fn new(invoker: Arc<ToolInvoker>) -> Self {
    Self { invoker }
  }

  pub fn invoker(&self) -> &ToolInvoker {
    &self.invoker
  }
}

impl Converter for ToolConverter {
  async fn convert(&self, job: &ConversionJob) -> Result<(), BuildError> {
    let arguments = job.command_line();
    debug!(item = %job.key, arguments = %arguments, "running converter");

    let started = Instant::now();
    self.invoker.run_to_completion(&arguments).await?;
    info!(
      item = %job.key,
      output = ?job.output,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "converted"
    );
    Ok(())
  }
}
